//! Notification sound played through an external command

use crate::config::SoundConfig;
use cosmic_ext_notify::{NotifyError, SoundSlot, SoundTrack};
use tokio::process::Command;
use tracing::debug;

/// Runs a player command once per audible alert pass
#[derive(Debug, Clone)]
pub struct CommandSound {
    program: String,
    args: Vec<String>,
}

impl CommandSound {
    pub fn new(config: &SoundConfig) -> cosmic_ext_notify::Result<Self> {
        let program = config.command.trim();
        if program.is_empty() {
            return Err(NotifyError::Sound("no sound command configured".to_string()));
        }
        Ok(Self {
            program: program.to_string(),
            args: config.args.clone(),
        })
    }
}

impl SoundTrack for CommandSound {
    fn play(&mut self) -> cosmic_ext_notify::Result<()> {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| NotifyError::Sound(format!("{}: {}", self.program, e)))?;
        debug!("Started {}", self.program);
        Ok(())
    }
}

/// Sound slot for the engine; the command is only checked on first use
pub fn slot(config: &SoundConfig) -> SoundSlot {
    if !config.enabled {
        return SoundSlot::disabled();
    }
    let config = config.clone();
    SoundSlot::new(move || {
        let track = CommandSound::new(&config)?;
        Ok(Box::new(track) as Box<dyn SoundTrack>)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_command_fails_once() {
        let config = SoundConfig {
            enabled: true,
            command: "  ".to_string(),
            args: Vec::new(),
        };
        let mut slot = slot(&config);

        assert!(!slot.play());
        assert!(!slot.is_created());
        assert!(!slot.play());
    }

    #[test]
    fn test_disabled_sound() {
        let config = SoundConfig {
            enabled: false,
            ..Default::default()
        };
        let mut slot = slot(&config);
        assert!(!slot.play());
        assert!(!slot.is_created());
    }

    #[tokio::test]
    async fn test_missing_program_reports_error() {
        let config = SoundConfig {
            enabled: true,
            command: "/nonexistent/cosmic-ext-notify-player".to_string(),
            args: Vec::new(),
        };
        let mut sound = CommandSound::new(&config).unwrap();
        assert!(matches!(sound.play(), Err(NotifyError::Sound(_))));
    }
}
