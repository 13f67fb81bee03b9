use crate::error::GatewayError;
use crate::options::{Options, RequestContext};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// The only variables a CGI script ever receives from the gateway.
pub const ENV_WHITELIST: [&str; 6] = [
    "DOCUMENT_ROOT",
    "SCRIPT_FILENAME",
    "SCRIPT_NAME",
    "REQUEST_URI",
    "QUERY_STRING",
    "PATH_INFO",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CgiEnvironment {
    vars: Vec<(String, String)>,
}

impl CgiEnvironment {
    /// Caller options win over the request context; empty values are skipped.
    pub fn build(options: &Options, context: &RequestContext) -> Self {
        let vars = ENV_WHITELIST
            .iter()
            .filter_map(|&key| {
                options
                    .var(key)
                    .filter(|v| !v.is_empty())
                    .or_else(|| context.var(key).filter(|v| !v.is_empty()))
                    .map(|v| (key.to_string(), v.to_string()))
            })
            .collect();
        CgiEnvironment { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for CgiEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.vars.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}

pub struct CgiHandler {
    pub script_path: PathBuf,
    pub interpreter: Option<String>,
}

impl CgiHandler {
    pub fn new(script_path: impl Into<PathBuf>, interpreter: Option<String>) -> Self {
        CgiHandler {
            script_path: script_path.into(),
            interpreter,
        }
    }

    /// Runs the script with exactly `env` as its environment and returns
    /// its standard output.
    pub fn execute(&self, env: &CgiEnvironment) -> Result<Vec<u8>, GatewayError> {
        if !Path::new(&self.script_path).exists() {
            return Err(GatewayError::ScriptNotFound(self.script_path.clone()));
        }

        let mut command = match &self.interpreter {
            Some(interpreter) => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(&self.script_path);
                cmd
            }
            None => Command::new(&self.script_path),
        };

        log::debug!("running {} with {}", self.script_path.display(), env);
        let output = command
            .env_clear()
            .envs(env.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        if !output.status.success() {
            log::warn!(
                "{} exited with {}: {}",
                self.script_path.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(output.stdout)
    }
}
