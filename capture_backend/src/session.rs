use std::time::{Duration, Instant};

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use sign_core::{
    CaptureEffect, CaptureMachine, CaptureState, FrameStep, Hand, HandsFrame, SequenceOutcome, NUM_LANDMARKS,
};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message};

use crate::protocol::{CaptureMode, ClientMessage, ServerMessage};
use crate::sequence_client::SequenceClient;
use crate::smooth_client::{SmoothClient, SmoothedReply};

/// Minimum spacing between single-frame calls to the gateway.
pub const PREDICTION_INTERVAL: Duration = Duration::from_millis(200);

/// Work the connection task has to run off the frame loop.
#[derive(Debug, PartialEq)]
pub enum Submission {
    Sequence { attempt: u64, frames: Vec<Vec<f32>> },
    Frame { session_id: String, hand: Hand },
}

#[derive(Debug, Default, PartialEq)]
pub struct Reaction {
    pub replies: Vec<ServerMessage>,
    pub submit: Option<Submission>,
    /// Gateway session whose history should be dropped.
    pub release: Option<String>,
}

/// Results coming back from spawned inference calls.
#[derive(Debug)]
enum Completion {
    Sequence { attempt: u64, outcome: SequenceOutcome },
    Smoothed { session_id: String, reply: SmoothedReply },
}

/// Gateway session used in single-frame mode. A fresh id is taken on every
/// target change or reset so old history never votes for the new target.
#[derive(Debug)]
struct FrameSession {
    id: String,
    last_sent: Option<Instant>,
    matched: bool,
}

impl FrameSession {
    fn new() -> Self {
        Self {
            id: format!("capture_{}", uuid::Uuid::new_v4().simple()),
            last_sent: None,
            matched: false,
        }
    }

    fn used(&self) -> bool {
        self.last_sent.is_some()
    }
}

/// Capture state for one connected camera stream.
pub struct Connection {
    mode: CaptureMode,
    machine: CaptureMachine,
    session: FrameSession,
    last_reported: Option<(&'static str, usize)>,
}

impl Connection {
    pub fn new(mode: CaptureMode) -> Self {
        Self {
            mode,
            machine: CaptureMachine::new(),
            session: FrameSession::new(),
            last_reported: None,
        }
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn state(&self) -> &CaptureState {
        self.machine.state()
    }

    #[cfg(test)]
    pub fn session_id(&self) -> &str {
        &self.session.id
    }

    pub fn handle_message(&mut self, now: Instant, msg: ClientMessage) -> Reaction {
        let mut reaction = Reaction::default();
        match msg {
            ClientMessage::Frame { hands } => match self.mode {
                CaptureMode::Sequence => match self.machine.on_frame(now, HandsFrame { hands }) {
                    FrameStep::Throttled => return reaction,
                    FrameStep::Accepted => {}
                    FrameStep::Submit(CaptureEffect::SubmitSequence { attempt, frames }) => {
                        reaction.submit = Some(Submission::Sequence { attempt, frames });
                    }
                },
                CaptureMode::SingleFrame => reaction.submit = self.single_frame(now, hands),
            },
            ClientMessage::SetTarget { target, mode } => {
                let mode = mode.unwrap_or(self.mode);
                let changed = mode != self.mode || self.machine.target() != Some(target.as_str());
                tracing::info!(%target, ?mode, "target set");
                if mode != self.mode {
                    self.mode = mode;
                    self.machine.reset();
                }
                self.machine.set_target(target);
                if changed {
                    reaction.release = self.restart_session();
                }
            }
            ClientMessage::Reset => {
                self.machine.reset();
                reaction.release = self.restart_session();
            }
        }
        if self.mode == CaptureMode::Sequence {
            reaction.replies.extend(self.state_update());
        }
        reaction
    }

    /// Applies a sequence inference completion. Completions for attempts
    /// that were reset in the meantime produce no replies.
    pub fn handle_outcome(&mut self, attempt: u64, outcome: SequenceOutcome) -> Vec<ServerMessage> {
        let pending = matches!(self.machine.state(), CaptureState::Predicting { attempt: a } if *a == attempt);
        if !pending {
            tracing::debug!(attempt, "dropping stale sequence result");
            return vec![];
        }
        let result = ServerMessage::from_outcome(&outcome, self.machine.target());
        self.machine.on_inference(attempt, outcome);
        let mut replies = vec![result];
        replies.extend(self.state_update());
        replies
    }

    /// Applies a stabilized single-frame answer. Answers for a previous
    /// session, or arriving after the target was already matched, are dropped.
    pub fn handle_smoothed(&mut self, session_id: &str, reply: SmoothedReply) -> Vec<ServerMessage> {
        if session_id != self.session.id || self.session.matched {
            tracing::debug!(session_id, "dropping stale single-frame result");
            return vec![];
        }
        let result = ServerMessage::from_smoothed(&reply, self.machine.target());
        if matches!(result, ServerMessage::Result { matches_target: true, .. }) {
            self.session.matched = true;
        }
        vec![result]
    }

    /// Session to release when the stream goes away.
    pub fn finish(&self) -> Option<String> {
        self.session.used().then(|| self.session.id.clone())
    }

    fn single_frame(&mut self, now: Instant, hands: Vec<Hand>) -> Option<Submission> {
        if self.session.matched {
            return None;
        }
        let hand = hands.into_iter().next()?;
        if hand.landmarks.len() != NUM_LANDMARKS {
            return None;
        }
        if let Some(last) = self.session.last_sent {
            if now.saturating_duration_since(last) <= PREDICTION_INTERVAL {
                return None;
            }
        }
        self.session.last_sent = Some(now);
        Some(Submission::Frame {
            session_id: self.session.id.clone(),
            hand,
        })
    }

    fn restart_session(&mut self) -> Option<String> {
        let old = std::mem::replace(&mut self.session, FrameSession::new());
        old.used().then_some(old.id)
    }

    fn state_update(&mut self) -> Option<ServerMessage> {
        let current = (self.machine.state().name(), self.machine.frame_count());
        if self.last_reported == Some(current) {
            return None;
        }
        self.last_reported = Some(current);
        Some(ServerMessage::State {
            state: current.0,
            frame_count: current.1,
        })
    }
}

/// The downstream services a connection talks to.
#[derive(Clone)]
pub struct Clients {
    pub sequence: SequenceClient,
    pub smooth: SmoothClient,
}

fn release(clients: &Clients, session_id: String) {
    let smooth = clients.smooth.clone();
    tokio::spawn(async move {
        if let Err(e) = smooth.reset(&session_id).await {
            tracing::warn!(%session_id, "failed to reset gateway session: {}", e);
        }
    });
}

pub async fn handle_connection(stream: TcpStream, clients: Clients, mode: CaptureMode) -> anyhow::Result<()> {
    let peer = stream.peer_addr().ok();
    let ws_stream = accept_async(stream)
        .await
        .context("websocket handshake failed")?;
    let (mut write, mut read) = ws_stream.split();
    tracing::info!(?peer, ?mode, "landmark source connected");

    let (done_tx, mut done_rx) = mpsc::channel::<Completion>(8);
    let mut conn = Connection::new(mode);

    loop {
        let replies = tokio::select! {
            msg = read.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        tracing::warn!(?peer, "websocket error: {}", e);
                        break;
                    }
                    None => break,
                };
                if msg.is_close() {
                    break;
                }
                if !msg.is_text() {
                    continue;
                }
                let text = msg.to_text().unwrap_or_default();
                let parsed = match serde_json::from_str::<ClientMessage>(text) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        tracing::debug!("ignoring malformed message: {}", e);
                        continue;
                    }
                };
                let reaction = conn.handle_message(Instant::now(), parsed);
                if let Some(session_id) = reaction.release {
                    release(&clients, session_id);
                }
                match reaction.submit {
                    Some(Submission::Sequence { attempt, frames }) => {
                        let client = clients.sequence.clone();
                        let tx = done_tx.clone();
                        tokio::spawn(async move {
                            let outcome = client.outcome(&frames).await;
                            let _ = tx.send(Completion::Sequence { attempt, outcome }).await;
                        });
                    }
                    Some(Submission::Frame { session_id, hand }) => {
                        let client = clients.smooth.clone();
                        let tx = done_tx.clone();
                        tokio::spawn(async move {
                            match client.predict(&session_id, &hand).await {
                                Ok(reply) => {
                                    let _ = tx.send(Completion::Smoothed { session_id, reply }).await;
                                }
                                Err(e) => tracing::warn!(%session_id, "single-frame prediction failed: {}", e),
                            }
                        });
                    }
                    None => {}
                }
                reaction.replies
            }
            Some(done) = done_rx.recv() => match done {
                Completion::Sequence { attempt, outcome } => {
                    tracing::info!(attempt, label = ?outcome.label(), confidence = outcome.confidence(), "sequence result");
                    conn.handle_outcome(attempt, outcome)
                }
                Completion::Smoothed { session_id, reply } => {
                    tracing::debug!(
                        %session_id,
                        label = %reply.label,
                        confidence = reply.confidence,
                        stable = reply.is_stable,
                        history = reply.history_length,
                        "single-frame result"
                    );
                    conn.handle_smoothed(&session_id, reply)
                }
            },
        };

        for reply in replies {
            let json = serde_json::to_string(&reply)?;
            write.send(Message::Text(json)).await?;
        }
    }

    if let Some(session_id) = conn.finish() {
        release(&clients, session_id);
    }
    tracing::info!(?peer, mode = ?conn.mode(), state = conn.state().name(), "landmark source disconnected");
    Ok(())
}
