mod state;
mod wire;

use std::sync::Arc;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            log_entry::{LogEntry, MAX_BATCH_SIZE},
            project::Project,
        },
    },
};
use tracing::info;

use crate::fanout::LiveFanout;
use state::ready;
use state_machines::core::GuardError;
use wire::WireBatch;

fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::InternalError(format!("invalid batch transition during {event}: {guard:?}"))
}

/// Either header carries the project credential; `X-API-Key` is checked
/// first, `Authorization: Bearer` as a fallback.
#[derive(Debug, Clone, Copy)]
pub enum CredentialSource<'a> {
    Bearer(&'a str),
    ApiKey(&'a str),
}

impl<'a> CredentialSource<'a> {
    fn as_str(self) -> &'a str {
        match self {
            Self::Bearer(token) | Self::ApiKey(token) => token,
        }
    }
}

pub struct BatchOutcome {
    pub accepted: usize,
    pub project_id: String,
    pub entries: Vec<LogEntry>,
}

/// Drives one submitted batch through the `parse -> authenticate -> validate
/// -> persist -> announce` lifecycle, modeled internally by a typed state
/// machine so a stage can't be skipped or re-entered out of order.
pub struct IngestionPipeline {
    db: Arc<SurrealDbClient>,
    fanout: Arc<LiveFanout>,
}

impl IngestionPipeline {
    pub fn new(db: Arc<SurrealDbClient>, fanout: Arc<LiveFanout>) -> Self {
        Self { db, fanout }
    }

    pub async fn handle_batch(
        &self,
        raw_body: &[u8],
        credential: Option<CredentialSource<'_>>,
    ) -> Result<BatchOutcome, AppError> {
        let machine = ready();

        let wire_batch: WireBatch = match serde_json::from_slice(raw_body) {
            Ok(batch) => batch,
            Err(err) => {
                let machine = machine.reject().map_err(|(_, guard)| map_guard_error("reject", &guard))?;
                drop(machine);
                return Err(AppError::MalformedPayload(err.to_string()));
            }
        };
        let machine = machine.parse().map_err(|(_, guard)| map_guard_error("parse", &guard))?;

        if wire_batch.entries.is_empty() {
            let machine = machine.reject().map_err(|(_, guard)| map_guard_error("reject", &guard))?;
            drop(machine);
            return Err(AppError::BatchEmpty);
        }
        if wire_batch.entries.len() > MAX_BATCH_SIZE {
            let machine = machine.reject().map_err(|(_, guard)| map_guard_error("reject", &guard))?;
            drop(machine);
            return Err(AppError::BatchTooLarge {
                max: MAX_BATCH_SIZE,
                actual: wire_batch.entries.len(),
            });
        }

        let project = match credential {
            None => return Err(AppError::MissingCredential),
            Some(source) => match Project::find_by_token(&self.db, source.as_str()).await? {
                Some(project) => project,
                None => return Err(AppError::InvalidCredential),
            },
        };
        let machine = machine.authenticate().map_err(|(_, guard)| map_guard_error("authenticate", &guard))?;

        let mut new_entries = Vec::with_capacity(wire_batch.entries.len());
        for (index, wire_entry) in wire_batch.entries.into_iter().enumerate() {
            let new_entry = wire_entry.into_new_log_entry().map_err(|field_err| AppError::EntryInvalid {
                index,
                field: field_err.0.to_string(),
                reason: format!("could not parse field '{}'", field_err.0),
            })?;
            if let Err(field) = new_entry.validate() {
                return Err(AppError::EntryInvalid {
                    index,
                    field: field.to_string(),
                    reason: format!("field '{field}' failed validation"),
                });
            }
            new_entries.push(new_entry);
        }
        let machine = machine.validate().map_err(|(_, guard)| map_guard_error("validate", &guard))?;

        let accepted = new_entries.len();
        let entries = LogEntry::insert_batch(&self.db, &project.id, new_entries).await?;
        let machine = machine.persist().map_err(|(_, guard)| map_guard_error("persist", &guard))?;

        self.fanout.publish(&entries);
        let _machine = machine.announce().map_err(|(_, guard)| map_guard_error("announce", &guard))?;

        info!(project = %project.slug, accepted, "batch ingested");
        Ok(BatchOutcome { accepted, project_id: project.id, entries })
    }
}
