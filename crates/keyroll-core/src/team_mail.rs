//! Team information mailing
//!
//! Sends every participant of a CSV roster their team assignment, access code
//! and the names of their teammates.

use crate::error::{AuthError, NotificationError};
use crate::notify::{Bindings, NotificationJob, NotificationKind, Notifier};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// One CSV row: `Name,Email,Team,Code`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Participant {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Team")]
    pub team: String,
    #[serde(rename = "Code")]
    pub code: String,
}

pub fn parse_participants<R: Read>(reader: R) -> Result<Vec<Participant>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    reader
        .deserialize()
        .enumerate()
        .map(|(index, row)| row.with_context(|| format!("Malformed participant row {}", index + 1)))
        .collect()
}

pub fn read_participants(path: &Path) -> Result<Vec<Participant>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open participants file {}", path.display()))?;
    let participants = parse_participants(file)
        .with_context(|| format!("Invalid participants file {}", path.display()))?;
    info!(path = %path.display(), participants = participants.len(), "Loaded participants");
    Ok(participants)
}

/// Names of the other members of `participant`'s team, in file order.
pub fn teammates_of<'a>(participants: &'a [Participant], participant: &Participant) -> Vec<&'a str> {
    participants
        .iter()
        .filter(|p| p.team == participant.team && p.email != participant.email)
        .map(|p| p.name.as_str())
        .collect()
}

/// Result of one team mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailOutcome {
    pub recipient: String,
    pub result: Result<(), String>,
}

impl Serialize for MailOutcome {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            recipient: &'a str,
            sent: bool,
            #[serde(skip_serializing_if = "Option::is_none")]
            error: Option<&'a str>,
        }

        Wire {
            recipient: &self.recipient,
            sent: self.result.is_ok(),
            error: self.result.as_ref().err().map(String::as_str),
        }
        .serialize(serializer)
    }
}

/// Mailing stopped because the shared session could not be renewed.
#[derive(Debug, Error)]
#[error("Team mail aborted after {} recipient(s): {source}", .outcomes.len())]
pub struct TeamMailAborted {
    /// Outcomes recorded before the abort, including the interrupted recipient
    pub outcomes: Vec<MailOutcome>,
    #[source]
    pub source: AuthError,
}

pub struct TeamMailer {
    notifier: Arc<dyn Notifier>,
    template_id: String,
    channel_name: String,
}

impl TeamMailer {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        template_id: impl Into<String>,
        channel_name: impl Into<String>,
    ) -> Self {
        Self {
            notifier,
            template_id: template_id.into(),
            channel_name: channel_name.into(),
        }
    }

    fn job_for(&self, participants: &[Participant], participant: &Participant) -> NotificationJob {
        NotificationJob {
            recipient: participant.email.clone(),
            kind: NotificationKind::TeamAssignment,
            template_id: self.template_id.clone(),
            bindings: Bindings::new()
                .with("name", participant.name.as_str())
                .with("team", participant.team.as_str())
                .with("code", participant.code.as_str())
                .with("teammates", teammates_of(participants, participant).join(", "))
                .with("discord_channel_name", self.channel_name.as_str()),
        }
    }

    /// Mail every participant. Failed sends are recorded and skipped; a lost
    /// session stops the run, keeping the outcomes recorded so far.
    pub async fn run(&self, participants: &[Participant]) -> Result<Vec<MailOutcome>, TeamMailAborted> {
        let mut outcomes = Vec::with_capacity(participants.len());

        for (index, participant) in participants.iter().enumerate() {
            let job = self.job_for(participants, participant);
            match self.notifier.send(job).await {
                Ok(()) => {
                    info!(recipient = %participant.email, team = %participant.team, "Team mail sent");
                    outcomes.push(MailOutcome {
                        recipient: participant.email.clone(),
                        result: Ok(()),
                    });
                }
                Err(NotificationError::Session(source)) => {
                    warn!(recipient = %participant.email, error = %source, "Team mail failed");
                    outcomes.push(MailOutcome {
                        recipient: participant.email.clone(),
                        result: Err(source.to_string()),
                    });
                    warn!(
                        unprocessed = participants.len() - index - 1,
                        "Session lost, aborting team mail"
                    );
                    return Err(TeamMailAborted { outcomes, source });
                }
                Err(e) => {
                    warn!(recipient = %participant.email, error = %e, "Team mail failed");
                    outcomes.push(MailOutcome {
                        recipient: participant.email.clone(),
                        result: Err(e.to_string()),
                    });
                }
            }
        }

        Ok(outcomes)
    }
}
