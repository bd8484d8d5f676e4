//! The SimpleDb select scenario: read flights, then read accounts.

use crate::error::RegistryError;
use crate::task::{Task, TaskRegistry};
use crate::user::VirtualUser;

pub const FLIGHT_PATH: &str = "/sql/test/select/flight";
pub const ACCOUNT_PATH: &str = "/sql/test/select/account";

/// Name the scenario task is registered under.
pub const TASK_NAME: &str = "select_flight_then_account";

/// GET the flight endpoint, then the account endpoint.
///
/// The account request is sent whatever the flight request returned.
pub struct SelectFlightThenAccount;

#[async_trait::async_trait]
impl Task for SelectFlightThenAccount {
    async fn run(&self, user: &VirtualUser) {
        user.get(FLIGHT_PATH).await;
        user.get(ACCOUNT_PATH).await;
    }
}

/// Registry holding the scenario task with weight 1.
pub fn registry() -> Result<TaskRegistry, RegistryError> {
    let mut registry = TaskRegistry::new();
    registry.register(TASK_NAME, 1, SelectFlightThenAccount)?;
    Ok(registry)
}
