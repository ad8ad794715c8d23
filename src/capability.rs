//! Optional platform capabilities
//!
//! Speech features depend on what the host provides. Each capability is
//! resolved once at startup into a [`Capability`] and handed to whatever
//! needs it; nothing probes the platform again afterwards.

use crate::config::SpeechConfig;
use crate::error::{Result, TutorError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// A platform feature that is either usable or explains why not
#[derive(Debug, Clone)]
pub enum Capability<T> {
    /// Ready to use
    Available(T),
    /// Not usable on this host
    Unavailable(String),
}

impl<T> Capability<T> {
    /// Whether the capability can be used
    pub fn is_available(&self) -> bool {
        matches!(self, Capability::Available(_))
    }

    /// The capability, if available
    pub fn get(&self) -> Option<&T> {
        match self {
            Capability::Available(value) => Some(value),
            Capability::Unavailable(_) => None,
        }
    }

    /// Why the capability is missing
    pub fn reason(&self) -> Option<&str> {
        match self {
            Capability::Available(_) => None,
            Capability::Unavailable(reason) => Some(reason),
        }
    }
}

/// Voice and rate for one utterance
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechOptions {
    /// Voice name, synthesizer specific
    pub voice: Option<String>,
    /// Rate multiplier, 1.0 is normal
    pub rate: f32,
}

impl Default for SpeechOptions {
    fn default() -> Self {
        Self {
            voice: None,
            rate: 1.0,
        }
    }
}

/// Reads text aloud
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Speak `text`, returning once playback has finished
    async fn speak(&self, text: &str, options: &SpeechOptions) -> Result<()>;
}

/// Synthesizer that pipes text to an external command's stdin
///
/// Arguments may contain `{voice}` and `{rate}`; they are replaced per
/// utterance. An argument containing `{voice}` is dropped when no voice is set.
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandSynthesizer {
    /// Parse a command line such as `espeak -s {rate}`
    ///
    /// # Errors
    ///
    /// Returns `TutorError::Speech` if the command line is empty
    ///
    /// # Examples
    ///
    /// ```
    /// use tutorchat::capability::CommandSynthesizer;
    ///
    /// let synth = CommandSynthesizer::parse("say -v {voice}").unwrap();
    /// assert_eq!(synth.program().to_str(), Some("say"));
    /// assert!(CommandSynthesizer::parse("   ").is_err());
    /// ```
    pub fn parse(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| TutorError::Speech("synthesis command is empty".to_string()))?;

        Ok(Self {
            program: PathBuf::from(program),
            args: parts.map(str::to_string).collect(),
        })
    }

    /// Executable to run
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn render_args(&self, options: &SpeechOptions) -> Vec<String> {
        self.args
            .iter()
            .filter_map(|arg| {
                if arg.contains("{voice}") {
                    let voice = options.voice.as_deref()?;
                    return Some(arg.replace("{voice}", voice));
                }
                Some(arg.replace("{rate}", &format!("{:.2}", options.rate)))
            })
            .collect()
    }
}

#[async_trait]
impl SpeechSynthesizer for CommandSynthesizer {
    async fn speak(&self, text: &str, options: &SpeechOptions) -> Result<()> {
        let args = self.render_args(options);
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TutorError::Speech(format!(
                    "failed to spawn `{}`: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| TutorError::Speech("synthesizer stdin unavailable".to_string()))?;
        if let Err(e) = stdin.write_all(text.as_bytes()).await {
            // A command that exits without reading is judged by its status
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(e.into());
            }
        }
        drop(stdin);

        let status = child.wait().await?;
        if !status.success() {
            return Err(TutorError::Speech(format!(
                "`{}` exited with {}",
                self.program.display(),
                status
            ))
            .into());
        }
        Ok(())
    }
}

/// Speech capabilities of this host, resolved once
#[derive(Clone)]
pub struct SpeechCapabilities {
    /// Text to speech
    pub synthesis: Capability<Arc<dyn SpeechSynthesizer>>,
    /// Speech to text; no terminal backend exists, so this only records why
    pub recognition: Capability<()>,
}

impl SpeechCapabilities {
    /// Probe the host according to the configuration
    pub fn resolve(config: &SpeechConfig) -> Self {
        let synthesis = match config.synthesis_command.as_deref().map(str::trim) {
            None | Some("") => {
                Capability::Unavailable("no speech synthesis command configured".to_string())
            }
            Some(command_line) => match CommandSynthesizer::parse(command_line) {
                Ok(synth) if find_executable(synth.program()).is_some() => {
                    tracing::debug!(command = command_line, "Speech synthesis available");
                    Capability::Available(Arc::new(synth) as Arc<dyn SpeechSynthesizer>)
                }
                Ok(synth) => Capability::Unavailable(format!(
                    "speech command `{}` not found",
                    synth.program().display()
                )),
                Err(e) => Capability::Unavailable(e.to_string()),
            },
        };

        if let Some(reason) = synthesis.reason() {
            tracing::info!("Speech synthesis unavailable: {}", reason);
        }

        Self {
            synthesis,
            recognition: Capability::Unavailable(
                "speech recognition is not supported in the terminal".to_string(),
            ),
        }
    }
}

/// Locate `program` directly or on `PATH`
fn find_executable(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return program.is_file().then(|| program.to_path_buf());
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(command: Option<&str>) -> SpeechConfig {
        SpeechConfig {
            synthesis_command: command.map(str::to_string),
        }
    }

    #[test]
    fn test_unconfigured_synthesis_is_unavailable() {
        let caps = SpeechCapabilities::resolve(&config(None));
        assert!(!caps.synthesis.is_available());
        assert!(caps.synthesis.reason().unwrap().contains("configured"));
        assert!(!caps.recognition.is_available());
        assert!(caps.recognition.reason().unwrap().contains("terminal"));
    }

    #[test]
    fn test_missing_command_is_unavailable() {
        let caps = SpeechCapabilities::resolve(&config(Some("tutorchat-no-such-speaker -q")));
        assert!(caps.synthesis.reason().unwrap().contains("not found"));
    }

    #[test]
    fn test_render_args_substitutes_placeholders() {
        let synth = CommandSynthesizer::parse("speak -v {voice} -r {rate} -").unwrap();
        let args = synth.render_args(&SpeechOptions {
            voice: Some("alto".into()),
            rate: 1.5,
        });
        assert_eq!(args, vec!["-v", "alto", "-r", "1.50", "-"]);

        let args = synth.render_args(&SpeechOptions::default());
        assert_eq!(args, vec!["-v", "-r", "1.00", "-"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_synthesizer_pipes_text() {
        let caps = SpeechCapabilities::resolve(&config(Some("cat")));
        let synth = caps.synthesis.get().expect("cat should be on PATH");
        synth
            .speak("hello", &SpeechOptions::default())
            .await
            .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_reports_error() {
        let synth = CommandSynthesizer::parse("false").unwrap();
        let err = synth
            .speak("hello", &SpeechOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exited"));
    }
}
