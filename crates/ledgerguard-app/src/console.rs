// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Line-oriented operator console.
//
// Every command counts as keyboard activity for the idle lock. While the
// session is locked only `resume`, `status`, `help` and `quit` are accepted.
//
// Leaving the console (`quit` or EOF) does not end the session: the key slot
// stays on disk so the next start can still read this session's ciphertext.
// Only `end-session` wipes it.

use ledgerguard_core::error::Result;
use ledgerguard_core::types::ActivityKind;
use ledgerguard_security::{HeaderMap, LockEvent, apply_security_headers, module_info, sanitize_html};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::services::app_services::SecurityServices;

const HELP: &str = "\
commands:
  append <label> <branch> <content...>   fingerprint content and chain it into the vault
  verify                                  verify the whole vault chain
  list                                    print every record
  encrypt <text...>                       encrypt under the session key
  decrypt <envelope>                      decrypt an envelope
  token | refresh                         show or rotate the CSRF token
  validate <token>                        check a CSRF token
  headers                                 show outgoing headers incl. CSRF token
  allow <key> [max]                       consult the rate limiter
  activity <kind>                         report activity (mousemove, keydown, ...)
  resume                                  unlock after inactivity
  sanitize <html...>                      run the HTML sanitizer
  status                                  session and module summary
  end-session                             wipe the session key and slots
  quit                                    leave; the session and its key are kept";

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Append {
        label: String,
        branch: String,
        content: String,
    },
    Verify,
    List,
    Encrypt(String),
    Decrypt(String),
    Token,
    Refresh,
    Validate(String),
    Headers,
    Allow {
        key: String,
        max: Option<usize>,
    },
    Activity(ActivityKind),
    Resume,
    Sanitize(String),
    Status,
    EndSession,
    Help,
    Quit,
}

/// Result of executing one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Reply(String),
    Quit,
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse(line: &str) -> std::result::Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();

    let required = |what: &str| -> std::result::Result<String, String> {
        if rest.is_empty() {
            Err(format!("usage: {verb} <{what}>"))
        } else {
            Ok(rest.to_owned())
        }
    };

    let command = match verb {
        "append" => {
            let mut parts = rest.splitn(3, char::is_whitespace);
            match (parts.next(), parts.next(), parts.next()) {
                (Some(label), Some(branch), Some(content))
                    if !label.is_empty() && !content.trim().is_empty() =>
                {
                    Command::Append {
                        label: label.to_owned(),
                        branch: branch.to_owned(),
                        content: content.trim().to_owned(),
                    }
                }
                _ => return Err("usage: append <label> <branch> <content...>".into()),
            }
        }
        "verify" => Command::Verify,
        "list" => Command::List,
        "encrypt" => Command::Encrypt(required("text")?),
        "decrypt" => Command::Decrypt(required("envelope")?),
        "token" => Command::Token,
        "refresh" => Command::Refresh,
        "validate" => Command::Validate(required("token")?),
        "headers" => Command::Headers,
        "allow" => {
            let mut parts = rest.split_whitespace();
            let key = parts.next().ok_or("usage: allow <key> [max]")?.to_owned();
            let max = match parts.next() {
                Some(n) => Some(n.parse().map_err(|_| format!("not a number: {n}"))?),
                None => None,
            };
            Command::Allow { key, max }
        }
        "activity" => Command::Activity(required("kind")?.parse()?),
        "resume" => Command::Resume,
        "sanitize" => Command::Sanitize(required("html")?),
        "status" => Command::Status,
        "end-session" => Command::EndSession,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command: {other} (try `help`)")),
    };
    Ok(Some(command))
}

/// Execute `command` against `services`.
pub fn execute(services: &SecurityServices, command: Command) -> Result<Outcome> {
    let lock = services.session_lock();
    let always_allowed = matches!(
        command,
        Command::Resume | Command::Status | Command::Help | Command::Quit
    );
    if lock.is_locked() && !always_allowed {
        return Ok(Outcome::Reply("session locked; type `resume` to continue".into()));
    }
    if !matches!(command, Command::Activity(_)) {
        lock.record_activity(ActivityKind::KeyDown);
    }

    let reply = match command {
        Command::Append {
            label,
            branch,
            content,
        } => {
            if !services.rate_limiter().allow("append") {
                return Ok(Outcome::Reply("rate limited, try again shortly".into()));
            }
            let record = services.append_document(content.as_bytes(), &label, &branch)?;
            serde_json::to_string_pretty(&record)?
        }
        Command::Verify => {
            if !services.rate_limiter().allow("verify") {
                return Ok(Outcome::Reply("rate limited, try again shortly".into()));
            }
            serde_json::to_string_pretty(&services.verify())?
        }
        Command::List => serde_json::to_string_pretty(&services.records())?,
        Command::Encrypt(text) => services.encrypt(&text)?,
        Command::Decrypt(envelope) => services.decrypt(&envelope)?,
        Command::Token => services.csrf().get_token()?,
        Command::Refresh => services.csrf().refresh()?,
        Command::Validate(token) => services.csrf().validate(&token).to_string(),
        Command::Headers => {
            let mut headers = services.csrf().add_to_headers(HeaderMap::new())?;
            apply_security_headers(&mut headers);
            serde_json::to_string_pretty(&headers)?
        }
        Command::Allow { key, max } => {
            let limiter = services.rate_limiter();
            let allowed = match max {
                Some(max) => limiter.allow_with_limit(&key, max),
                None => limiter.allow(&key),
            };
            allowed.to_string()
        }
        Command::Activity(kind) => {
            lock.record_activity(kind);
            "ok".into()
        }
        Command::Resume => {
            if lock.resume() {
                "session resumed".into()
            } else {
                "session already active".into()
            }
        }
        Command::Sanitize(html) => sanitize_html(&html),
        Command::Status => {
            let status = serde_json::json!({
                "session_id": lock.session_id(),
                "state": lock.state().to_string(),
                "timeout_ms": lock.config().timeout_ms,
                "records": services.records().len(),
                "data_dir": services.data_dir().map(|p| p.display().to_string()),
                "module": module_info(),
            });
            serde_json::to_string_pretty(&status)?
        }
        Command::EndSession => {
            services.end_session()?;
            "session ended; session key wiped".into()
        }
        Command::Help => HELP.into(),
        Command::Quit => return Ok(Outcome::Quit),
    };
    Ok(Outcome::Reply(reply))
}

/// Read commands from stdin until EOF or `quit`, printing lock notifications
/// as they arrive.
pub async fn run(services: &SecurityServices) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut events = services.session_lock().notifications();
    let mut out = tokio::io::stdout();

    write_line(&mut out, "ledgerguard console (type `help`)").await?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let reply = match parse(&line) {
                    Ok(None) => continue,
                    Ok(Some(command)) => {
                        debug!(?command, "console command");
                        match execute(services, command) {
                            Ok(Outcome::Quit) => break,
                            Ok(Outcome::Reply(text)) => text,
                            Err(e) => {
                                warn!(error = %e, "command failed");
                                format!("error: {e}")
                            }
                        }
                    }
                    Err(usage) => usage,
                };
                write_line(&mut out, &reply).await?;
            }
            event = events.recv() => match event {
                Ok(LockEvent::Locked { title, message, .. }) => {
                    write_line(&mut out, &format!("[{title}] {message}")).await?;
                }
                Ok(LockEvent::Resumed { .. }) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "lock notifications dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    write_line(
        &mut out,
        "session kept; run `end-session` to wipe the session key",
    )
    .await?;
    Ok(())
}

async fn write_line(out: &mut tokio::io::Stdout, text: &str) -> Result<()> {
    out.write_all(text.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use ledgerguard_core::AppConfig;
    use ledgerguard_core::types::SessionLockState;
    use ledgerguard_security::CSRF_HEADER;

    use super::*;

    fn reply(services: &SecurityServices, line: &str) -> String {
        let command = parse(line).unwrap().unwrap();
        match execute(services, command).unwrap() {
            Outcome::Reply(text) => text,
            Outcome::Quit => panic!("unexpected quit"),
        }
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse("   ").unwrap(), None);
        assert_eq!(
            parse("append DD250 Navy  first receipt ").unwrap(),
            Some(Command::Append {
                label: "DD250".into(),
                branch: "Navy".into(),
                content: "first receipt".into(),
            })
        );
        assert_eq!(
            parse("allow anchor 3").unwrap(),
            Some(Command::Allow {
                key: "anchor".into(),
                max: Some(3),
            })
        );
        assert_eq!(
            parse("activity mousemove").unwrap(),
            Some(Command::Activity(ActivityKind::PointerMove))
        );
        assert_eq!(parse("exit").unwrap(), Some(Command::Quit));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(parse("append onlylabel").is_err());
        assert!(parse("encrypt").is_err());
        assert!(parse("allow k many").is_err());
        assert!(parse("activity click").is_err());
        assert!(parse("frobnicate").is_err());
    }

    #[tokio::test]
    async fn append_then_verify() {
        let services = SecurityServices::in_memory(AppConfig::default()).unwrap();
        let record = reply(&services, "append Invoice Army pallet of rations");
        assert!(record.contains("chainHash"));

        let report: serde_json::Value =
            serde_json::from_str(&reply(&services, "verify")).unwrap();
        assert_eq!(report["valid"], true);
    }

    #[tokio::test]
    async fn encrypt_decrypt_through_console() {
        let services = SecurityServices::in_memory(AppConfig::default()).unwrap();
        let envelope = reply(&services, "encrypt top secret");
        assert_eq!(reply(&services, &format!("decrypt {envelope}")), "top secret");
    }

    #[tokio::test]
    async fn headers_include_csrf_token() {
        let services = SecurityServices::in_memory(AppConfig::default()).unwrap();
        let token = reply(&services, "token");
        let headers: HeaderMap = serde_json::from_str(&reply(&services, "headers")).unwrap();
        assert_eq!(headers[CSRF_HEADER], token);
        assert_eq!(headers["X-Frame-Options"], "DENY");
        assert_eq!(reply(&services, &format!("validate {token}")), "true");
    }

    #[tokio::test(start_paused = true)]
    async fn locked_session_refuses_work_until_resume() {
        let mut config = AppConfig::default();
        config.session.timeout_ms = 100;
        let services = SecurityServices::in_memory(config).unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        assert_eq!(services.session_lock().state(), SessionLockState::Locked);

        assert!(reply(&services, "token").contains("session locked"));
        assert_eq!(reply(&services, "resume"), "session resumed");
        assert_eq!(reply(&services, "token").len(), 64);
    }

    #[tokio::test]
    async fn quit_keeps_session_key_until_end_session() {
        let dir = tempfile::tempdir().unwrap();
        let slot = dir.path().join("session").join(AppConfig::default().key_slot);

        let envelope = {
            let services = SecurityServices::open(dir.path()).unwrap();
            let envelope = reply(&services, "encrypt kept across restarts");
            assert_eq!(execute(&services, Command::Quit).unwrap(), Outcome::Quit);
            envelope
        };
        assert!(slot.exists());

        let services = SecurityServices::open(dir.path()).unwrap();
        assert_eq!(
            reply(&services, &format!("decrypt {envelope}")),
            "kept across restarts"
        );

        reply(&services, "end-session");
        assert!(!slot.exists());
    }

    #[tokio::test]
    async fn quit_ends_the_loop() {
        let services = SecurityServices::in_memory(AppConfig::default()).unwrap();
        assert_eq!(execute(&services, Command::Quit).unwrap(), Outcome::Quit);
    }
}
