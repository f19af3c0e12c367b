pub mod authenticate;
pub mod report;
pub mod snapshot;

/// How a command finished when it did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    UserNotFound,
    LookupUnavailable,
}

impl CommandStatus {
    pub fn exit_code(self) -> u8 {
        match self {
            CommandStatus::Success => 0,
            CommandStatus::UserNotFound => 2,
            CommandStatus::LookupUnavailable => 3,
        }
    }
}

pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_INTERRUPTED: u8 = 130;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(CommandStatus::Success.exit_code(), 0);
        assert_eq!(CommandStatus::UserNotFound.exit_code(), 2);
        assert_eq!(CommandStatus::LookupUnavailable.exit_code(), 3);
        assert_ne!(EXIT_FAILURE, EXIT_INTERRUPTED);
    }
}
