//! The closed set of permissions a plugin may request.

use serde::{Deserialize, Serialize};

/// A single permission a plugin's manifest may require.
///
/// Closed set: equality is by tag, ordering is not meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Read access to the filesystem.
    FilesystemRead,
    /// Write access to the filesystem.
    FilesystemWrite,
    /// Outbound network connections.
    NetworkClient,
    /// Inbound network listeners.
    NetworkServer,
    /// Read access to the host's database.
    DatabaseRead,
    /// Write access to the host's database.
    DatabaseWrite,
    /// Read access to process environment variables.
    AccessEnv,
    /// Ability to register HTTP routes with the host.
    HttpRegisterRoutes,
    /// Ability to publish events on the event bus.
    EventPublish,
    /// Ability to subscribe to events on the event bus.
    EventSubscribe,
    /// Ability to spawn external commands/processes.
    ExecuteCommands,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let p = Permission::ExecuteCommands;
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "\"execute_commands\"");
        let back: Permission = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
