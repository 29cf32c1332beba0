//! Recognised notification events and their fixed texts.

pub const TEST_EVENT: &str = "test";
pub const SYSTEM_READY_EVENT: &str = "system_ready";

pub const SYSTEM_READY_TITLE: &str = "Bealink";
pub const TEST_TITLE: &str = "Bealink - test notification";
pub const TEST_BODY: &str = "This is a connection test from the Bealink agent.";
pub const ENCRYPTED_SUFFIX: &str = "\n(sent over encrypted channel)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Agent started or host woke up.
    SystemReady,
    Test,
}

impl EventKind {
    /// `startup` and `wakeup` are older names for `system_ready`.
    pub fn parse(event: &str) -> Option<Self> {
        match event {
            SYSTEM_READY_EVENT | "startup" | "wakeup" => Some(Self::SystemReady),
            TEST_EVENT => Some(Self::Test),
            _ => None,
        }
    }

    /// Fixed `(title, body)` for this event.
    pub fn template(self, hostname: &str, encrypted: bool) -> (String, String) {
        match self {
            Self::SystemReady => (
                SYSTEM_READY_TITLE.to_string(),
                format!("💻 Host {hostname} is ready"),
            ),
            Self::Test => {
                let mut body = TEST_BODY.to_string();
                if encrypted {
                    body.push_str(ENCRYPTED_SUFFIX);
                }
                (TEST_TITLE.to_string(), body)
            }
        }
    }
}
