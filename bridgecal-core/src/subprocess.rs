//! Subprocess-backed calendar adapter.
//!
//! Spawns an external adapter binary (`bridgecal-adapter-outlook`,
//! `bridgecal-adapter-google` by default) per call and exchanges one JSON
//! request/response line over stdin/stdout. The binaries own COM, OAuth and
//! API details; their stderr is inherited so operator-facing diagnostics
//! stay visible.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command as ProcessCommand;
use tokio::time::timeout;

use crate::adapter::{AdapterError, AdapterResult, CalendarAdapter, EventPage};
use crate::event::{CanonicalEvent, Origin};
use crate::protocol::{
    Ack, Command, CreateEventParams, CreatedEventData, DeleteEventParams, ErrorKind,
    ListEventsData, ListEventsParams, Request, Response, UpdateEventParams, WireEvent,
};
use crate::window::SyncWindow;

pub struct AdapterProcess {
    side: Origin,
    command: String,
    timeout: Duration,
}

impl AdapterProcess {
    pub fn new(side: Origin, command: impl Into<String>, timeout: Duration) -> Self {
        AdapterProcess {
            side,
            command: command.into(),
            timeout,
        }
    }

    async fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        command: Command,
        params: P,
    ) -> AdapterResult<R> {
        timeout(self.timeout, self.call_inner(command, params))
            .await
            .map_err(|_| {
                AdapterError::Transient(format!(
                    "{} adapter timed out after {}s",
                    self.side,
                    self.timeout.as_secs()
                ))
            })?
    }

    async fn call_inner<P: Serialize, R: DeserializeOwned>(
        &self,
        command: Command,
        params: P,
    ) -> AdapterResult<R> {
        let request = Request {
            command,
            params: serde_json::to_value(params)
                .map_err(|e| AdapterError::Transient(format!("encode request: {e}")))?,
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| AdapterError::Transient(format!("encode request: {e}")))?;

        let mut child = ProcessCommand::new(&self.command)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    AdapterError::Config(format!(
                        "adapter binary '{}' not found; set adapters.{}_command",
                        self.command, self.side
                    ))
                } else {
                    AdapterError::Transient(format!("spawn {}: {e}", self.command))
                }
            })?;

        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| AdapterError::Transient("no stdin handle".to_string()))?;
            stdin
                .write_all(request_json.as_bytes())
                .await
                .map_err(|e| AdapterError::Transient(format!("write request: {e}")))?;
            stdin
                .write_all(b"\n")
                .await
                .map_err(|e| AdapterError::Transient(format!("write request: {e}")))?;
            stdin
                .flush()
                .await
                .map_err(|e| AdapterError::Transient(format!("write request: {e}")))?;
            // Dropping stdin signals EOF.
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AdapterError::Transient("no stdout handle".to_string()))?;
        let mut reader = BufReader::new(stdout);
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .await
            .map_err(|e| AdapterError::Transient(format!("read response: {e}")))?;

        if line.trim().is_empty() {
            return Err(AdapterError::Transient(format!(
                "{} adapter returned no response",
                self.side
            )));
        }

        let status = child
            .wait()
            .await
            .map_err(|e| AdapterError::Transient(format!("wait for adapter: {e}")))?;
        if !status.success() {
            return Err(AdapterError::Transient(format!(
                "{} adapter exited with status {}",
                self.side,
                status.code().unwrap_or(-1)
            )));
        }

        let response: Response<R> = serde_json::from_str(&line)
            .map_err(|e| AdapterError::Transient(format!("parse response: {e}")))?;

        match response {
            Response::Success { data } => Ok(data),
            Response::Error { error, kind } => Err(match kind {
                ErrorKind::Config => AdapterError::Config(error),
                ErrorKind::Auth => AdapterError::Auth(error),
                ErrorKind::Transient => AdapterError::Transient(error),
                ErrorKind::Missing => AdapterError::Missing,
            }),
        }
    }
}

#[async_trait]
impl CalendarAdapter for AdapterProcess {
    fn side(&self) -> Origin {
        self.side
    }

    async fn list_events(
        &self,
        window: &SyncWindow,
        cursor: Option<&str>,
    ) -> AdapterResult<EventPage> {
        let params = ListEventsParams {
            from: window.start.to_rfc3339(),
            to: window.end.to_rfc3339(),
            cursor: cursor.map(str::to_string),
        };
        let data: ListEventsData = self.call(Command::ListEvents, params).await?;
        Ok(EventPage {
            events: data.events,
            next_cursor: data.next_cursor,
        })
    }

    async fn create(&self, event: &CanonicalEvent) -> AdapterResult<String> {
        let params = CreateEventParams {
            event: WireEvent::from_canonical(event),
        };
        let data: CreatedEventData = self.call(Command::CreateEvent, params).await?;
        if data.id.is_empty() {
            return Err(AdapterError::Transient(format!(
                "{} adapter returned an empty id for a created event",
                self.side
            )));
        }
        Ok(data.id)
    }

    async fn update(&self, id: &str, event: &CanonicalEvent) -> AdapterResult<()> {
        let params = UpdateEventParams {
            event_id: id.to_string(),
            event: WireEvent::from_canonical(event),
        };
        let _: Ack = self.call(Command::UpdateEvent, params).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> AdapterResult<()> {
        let params = DeleteEventParams {
            event_id: id.to_string(),
        };
        let result: AdapterResult<Ack> = self.call(Command::DeleteEvent, params).await;
        match result {
            Ok(_) | Err(AdapterError::Missing) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn health_check(&self) -> AdapterResult<()> {
        let _: Ack = self.call(Command::HealthCheck, Ack::default()).await?;
        Ok(())
    }
}
