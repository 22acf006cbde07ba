//! Interactive credential prompt on the controlling terminal.
//!
//! Standard input may carry the change stream of a write, so both the
//! identity and the password are read from `/dev/tty`. Accepted
//! credentials the user chose to keep are remembered per site for the
//! lifetime of the process.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::{AuthInfo, Credential, CredentialCache, PromptError};

const TTY: &str = "/dev/tty";

/// Terminal prompt with an in-process credential cache
#[derive(Default)]
pub struct TerminalPrompt {
    cache: DashMap<String, (String, String)>,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialCache for TerminalPrompt {
    async fn check_cached(&self, info: &AuthInfo) -> Option<Credential> {
        self.cache.get(&info.site).map(|entry| {
            let (username, password) = entry.value().clone();
            Credential {
                username,
                password,
                keep: true,
            }
        })
    }

    async fn prompt(
        &self,
        info: &AuthInfo,
        annotation: Option<&str>,
    ) -> Result<Credential, PromptError> {
        let info = info.clone();
        let annotation = annotation.map(str::to_string);
        tokio::task::spawn_blocking(move || prompt_tty(&info, annotation.as_deref()))
            .await
            .map_err(|e| PromptError::Unavailable(e.to_string()))?
    }

    async fn persist(&self, info: &AuthInfo, credential: &Credential) {
        debug!("Remembering credentials for {}", info.site);
        self.cache.insert(
            info.site.clone(),
            (credential.username.clone(), credential.password.clone()),
        );
    }
}

fn prompt_tty(info: &AuthInfo, annotation: Option<&str>) -> Result<Credential, PromptError> {
    let tty = File::open(TTY).map_err(|e| PromptError::Unavailable(format!("{}: {}", TTY, e)))?;
    let mut input = BufReader::new(tty);
    let unavailable = |e: io::Error| PromptError::Unavailable(e.to_string());

    let mut stderr = io::stderr();
    if let Some(annotation) = annotation {
        writeln!(stderr, "{}", annotation).map_err(unavailable)?;
    }
    writeln!(stderr, "Authentication required for {}", info.site).map_err(unavailable)?;
    if !info.realm.is_empty() {
        writeln!(stderr, "Realm: {}", info.realm).map_err(unavailable)?;
    }

    let username = match read_field(&mut input, &mut stderr, &format!("User [{}]: ", info.identity))? {
        Some(name) if name.is_empty() => info.identity.clone(),
        Some(name) => name,
        None => return Err(PromptError::Canceled),
    };

    let password = rpassword::prompt_password("Password: ").map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::Interrupted => PromptError::Canceled,
        _ => PromptError::Unavailable(e.to_string()),
    })?;

    let keep = matches!(
        read_field(&mut input, &mut stderr, "Remember for this session? [y/N]: ")?
            .as_deref()
            .map(str::to_ascii_lowercase)
            .as_deref(),
        Some("y") | Some("yes")
    );

    Ok(Credential {
        username,
        password,
        keep,
    })
}

/// Read one trimmed line; `None` on end of input
fn read_field(
    input: &mut impl BufRead,
    out: &mut impl Write,
    label: &str,
) -> Result<Option<String>, PromptError> {
    let unavailable = |e: io::Error| PromptError::Unavailable(e.to_string());
    write!(out, "{}", label).map_err(unavailable)?;
    out.flush().map_err(unavailable)?;

    let mut line = String::new();
    if input.read_line(&mut line).map_err(unavailable)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}
