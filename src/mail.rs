//! Outgoing notification email.
//!
//! Message content is plain text provided by the caller; rendering rich
//! bodies is somebody else's job. Sending is fire-and-forget: failures are
//! logged and never propagated to the paths that triggered them.

use lettre::{SendableEmail, SendmailTransport, Transport as _};
use lettre_email::{EmailBuilder, Mailbox};
use serde::{Deserialize, Deserializer};
use std::cell::RefCell;

use crate::Result;

pub struct Mailer {
    config: Config,
    transport: RefCell<Transport>,
}

/// Mail system configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Email address to send messages as.
    #[serde(deserialize_with = "de_mailbox")]
    pub sender: Mailbox,
    /// Transport method to use, and its configuration.
    #[serde(flatten)]
    pub transport: Transports,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Mail transport configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum Transports {
    /// Log messages to standard error.
    Log,
    /// Use the `sendmail(1)` command.
    Sendmail,
}

impl Mailer {
    pub fn from_config(config: Config) -> Result<Mailer> {
        let transport = match config.transport {
            Transports::Log => Transport::Log,
            Transports::Sendmail => Transport::Sendmail(SendmailTransport::new()),
        };

        Ok(Mailer {
            config,
            transport: RefCell::new(transport),
        })
    }

    pub fn send<M>(&self, to: M, subject: &str, text: &str)
    where
        M: Into<Mailbox>,
    {
        self.transport.borrow_mut()
            .send(&self.config, to.into(), subject, text);
    }
}

impl Clone for Mailer {
    fn clone(&self) -> Mailer {
        Mailer::from_config(self.config.clone())
            .expect("cannot recreate mailer")
    }
}

enum Transport {
    Log,
    Sendmail(SendmailTransport),
}

impl Transport {
    fn send(&mut self, config: &Config, to: Mailbox, subject: &str, text: &str) {
        match *self {
            Transport::Log => log_mail(to, subject, text),
            Transport::Sendmail(ref mut t) => {
                match construct(config, to, subject, text) {
                    Ok(email) => if let Err(err) = t.send(email) {
                        error!("could not send email: {}", err);
                    },
                    Err(err) => error!("could not construct email: {}", err),
                }
            }
        }
    }
}

fn log_mail(to: Mailbox, subject: &str, text: &str) {
    eprintln!("To: {}\nSubject: {}\n{}", to, subject, text);
}

fn construct(config: &Config, to: Mailbox, subject: &str, text: &str)
-> Result<SendableEmail> {
    Ok(EmailBuilder::new()
        .to(to)
        .from(config.sender.clone())
        .subject(subject)
        .text(text)
        .build()?
        .into())
}

fn de_mailbox<'de, D>(d: D) -> std::result::Result<Mailbox, D::Error>
where
    D: Deserializer<'de>,
{
    d.deserialize_str(MailboxVisitor)
}

struct MailboxVisitor;

impl<'de> serde::de::Visitor<'de> for MailboxVisitor {
    type Value = Mailbox;

    fn expecting(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "an email address")
    }

    fn visit_str<E>(self, v: &str) -> std::result::Result<Mailbox, E>
    where
        E: serde::de::Error,
    {
        use serde::de::Unexpected;

        v.parse()
            .map_err(|_| E::invalid_value(Unexpected::Str(v), &"an email address"))
    }
}
