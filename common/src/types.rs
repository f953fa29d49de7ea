use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppState {
    Ready,
    Error,
    Party,
    Wait,
    Settings,
    Standby,
}

impl AppState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::Error => "ERROR",
            Self::Party => "PARTY",
            Self::Wait => "WAIT",
            Self::Settings => "SETTINGS",
            Self::Standby => "STANDBY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NoWifi,
    NoNetworkAtBoot,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoWifi => "NO_WIFI",
            Self::NoNetworkAtBoot => "NO_NETWORK_AT_BOOT",
        }
    }
}

/// Entries of the settings menu, in cycling order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsOption {
    Exit,
    Voice,
    Ip,
    ConnectionTest,
}

impl SettingsOption {
    pub fn next(self) -> Self {
        match self {
            Self::Exit => Self::Voice,
            Self::Voice => Self::Ip,
            Self::Ip => Self::ConnectionTest,
            Self::ConnectionTest => Self::Exit,
        }
    }

    /// Spoken name of the option.
    pub fn label(self) -> &'static str {
        match self {
            Self::Exit => "Exit.",
            Self::Voice => "Voice.",
            Self::Ip => "I P address.",
            Self::ConnectionTest => "Connection test.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Voice {
    #[default]
    Sam,
    Elf,
    Robot,
    StuffyGuy,
    LittleOldLady,
    ExtraTerrestrial,
}

impl Voice {
    pub fn next(self) -> Self {
        match self {
            Self::Sam => Self::Elf,
            Self::Elf => Self::Robot,
            Self::Robot => Self::StuffyGuy,
            Self::StuffyGuy => Self::LittleOldLady,
            Self::LittleOldLady => Self::ExtraTerrestrial,
            Self::ExtraTerrestrial => Self::Sam,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sam => "sam",
            Self::Elf => "elf",
            Self::Robot => "robot",
            Self::StuffyGuy => "stuffy guy",
            Self::LittleOldLady => "little old lady",
            Self::ExtraTerrestrial => "extra terrestrial",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn settings_options_cycle_back_to_exit() {
        let mut option = SettingsOption::Exit;
        let mut seen = Vec::new();
        for _ in 0..4 {
            option = option.next();
            seen.push(option);
        }

        assert_eq!(
            seen,
            vec![
                SettingsOption::Voice,
                SettingsOption::Ip,
                SettingsOption::ConnectionTest,
                SettingsOption::Exit,
            ]
        );
    }

    #[test]
    fn voice_round_trips_through_config_json() {
        let json = serde_json::to_string(&Voice::LittleOldLady).unwrap();
        assert_eq!(json, "\"little_old_lady\"");
        assert_eq!(serde_json::from_str::<Voice>(&json).unwrap(), Voice::LittleOldLady);
    }
}
