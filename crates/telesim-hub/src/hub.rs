//! Hub actor: owns every session group and every subscriber sender.

use std::collections::{HashMap, HashSet};

use telesim_protocol::{SessionId, SubscriberId, TelemetryEvent};
use tokio::sync::{mpsc, oneshot};

use crate::HubError;

/// Command channel capacity used by [`BroadcastHub::spawn_default`].
pub const DEFAULT_CHANNEL_SIZE: usize = 256;

/// Channel the hub uses to push events to one subscriber.
pub type SubscriberSender = mpsc::UnboundedSender<TelemetryEvent>;

/// Commands sent to the hub actor through its channel.
enum HubCommand {
    Join {
        subscriber: SubscriberId,
        sender: SubscriberSender,
        session_id: SessionId,
        reply: oneshot::Sender<bool>,
    },
    Leave {
        subscriber: SubscriberId,
        session_id: SessionId,
        reply: oneshot::Sender<bool>,
    },
    Disconnect {
        subscriber: SubscriberId,
    },
    Publish {
        event: TelemetryEvent,
        reply: oneshot::Sender<usize>,
    },
    GroupSize {
        session_id: SessionId,
        reply: oneshot::Sender<usize>,
    },
    SubscriberCount {
        reply: oneshot::Sender<usize>,
    },
    Shutdown,
}

/// Handle to the running hub actor.
///
/// Cheap to clone: it wraps an `mpsc::Sender`. Every call fails with
/// [`HubError::Unavailable`] once the actor has stopped.
#[derive(Clone)]
pub struct BroadcastHub {
    sender: mpsc::Sender<HubCommand>,
}

impl BroadcastHub {
    /// Spawns the hub task. `channel_size` bounds the command queue;
    /// callers wait when it is full.
    pub fn spawn(channel_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(channel_size.max(1));
        let actor = HubActor {
            groups: HashMap::new(),
            subscribers: HashMap::new(),
            receiver: rx,
        };
        tokio::spawn(actor.run());
        Self { sender: tx }
    }

    pub fn spawn_default() -> Self {
        Self::spawn(DEFAULT_CHANNEL_SIZE)
    }

    /// Adds `subscriber` to `session_id`'s group.
    ///
    /// Idempotent. The subscriber always receives a `SessionJoined`
    /// acknowledgement. `sender` replaces any sender previously registered
    /// for this subscriber. Returns `true` if the subscriber was not
    /// already in the group.
    pub async fn join(
        &self,
        subscriber: SubscriberId,
        sender: SubscriberSender,
        session_id: SessionId,
    ) -> Result<bool, HubError> {
        self.request(|reply| HubCommand::Join {
            subscriber,
            sender,
            session_id,
            reply,
        })
        .await
    }

    /// Removes `subscriber` from `session_id`'s group and acknowledges
    /// with `SessionLeft`. Returns whether it was a member.
    pub async fn leave(&self, subscriber: SubscriberId, session_id: SessionId) -> Result<bool, HubError> {
        self.request(|reply| HubCommand::Leave {
            subscriber,
            session_id,
            reply,
        })
        .await
    }

    /// Removes `subscriber` from every group and forgets its sender.
    pub async fn disconnect(&self, subscriber: SubscriberId) -> Result<(), HubError> {
        self.sender
            .send(HubCommand::Disconnect { subscriber })
            .await
            .map_err(|_| HubError::Unavailable)
    }

    /// Delivers `event` to every subscriber in its session's group.
    ///
    /// Returns the number of subscribers it was handed to.
    pub async fn publish(&self, event: TelemetryEvent) -> Result<usize, HubError> {
        self.request(|reply| HubCommand::Publish { event, reply }).await
    }

    pub async fn group_size(&self, session_id: SessionId) -> Result<usize, HubError> {
        self.request(|reply| HubCommand::GroupSize { session_id, reply })
            .await
    }

    /// Subscribers currently known to the hub, across all groups.
    pub async fn subscriber_count(&self) -> Result<usize, HubError> {
        self.request(|reply| HubCommand::SubscriberCount { reply })
            .await
    }

    /// Stops the hub task. Queued commands ahead of this one still run.
    pub async fn shutdown(&self) -> Result<(), HubError> {
        self.sender
            .send(HubCommand::Shutdown)
            .await
            .map_err(|_| HubError::Unavailable)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> HubCommand,
    ) -> Result<T, HubError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| HubError::Unavailable)?;
        reply_rx.await.map_err(|_| HubError::Unavailable)
    }
}

struct Subscriber {
    sender: SubscriberSender,
    sessions: HashSet<SessionId>,
}

/// The hub state. Runs inside a Tokio task.
struct HubActor {
    groups: HashMap<SessionId, HashSet<SubscriberId>>,
    subscribers: HashMap<SubscriberId, Subscriber>,
    receiver: mpsc::Receiver<HubCommand>,
}

impl HubActor {
    async fn run(mut self) {
        tracing::debug!("broadcast hub started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                HubCommand::Join {
                    subscriber,
                    sender,
                    session_id,
                    reply,
                } => {
                    let _ = reply.send(self.handle_join(subscriber, sender, session_id));
                }
                HubCommand::Leave {
                    subscriber,
                    session_id,
                    reply,
                } => {
                    let _ = reply.send(self.handle_leave(subscriber, session_id));
                }
                HubCommand::Disconnect { subscriber } => {
                    self.remove_subscriber(subscriber);
                }
                HubCommand::Publish { event, reply } => {
                    let _ = reply.send(self.handle_publish(event));
                }
                HubCommand::GroupSize { session_id, reply } => {
                    let _ = reply.send(self.groups.get(&session_id).map_or(0, HashSet::len));
                }
                HubCommand::SubscriberCount { reply } => {
                    let _ = reply.send(self.subscribers.len());
                }
                HubCommand::Shutdown => {
                    tracing::info!(subscribers = self.subscribers.len(), "broadcast hub shutting down");
                    break;
                }
            }
        }

        tracing::debug!("broadcast hub stopped");
    }

    fn handle_join(
        &mut self,
        subscriber: SubscriberId,
        sender: SubscriberSender,
        session_id: SessionId,
    ) -> bool {
        let entry = self.subscribers.entry(subscriber).or_insert_with(|| Subscriber {
            sender: sender.clone(),
            sessions: HashSet::new(),
        });
        entry.sender = sender;
        let newly = entry.sessions.insert(session_id);
        self.groups.entry(session_id).or_default().insert(subscriber);

        if newly {
            tracing::info!(
                %subscriber,
                %session_id,
                group_size = self.groups.get(&session_id).map_or(0, HashSet::len),
                "subscriber joined session group"
            );
        }
        self.send_to(subscriber, TelemetryEvent::SessionJoined { session_id });
        newly
    }

    fn handle_leave(&mut self, subscriber: SubscriberId, session_id: SessionId) -> bool {
        let Some(entry) = self.subscribers.get_mut(&subscriber) else {
            return false;
        };
        let was_member = entry.sessions.remove(&session_id);
        self.drop_from_group(subscriber, session_id);

        if was_member {
            tracing::info!(%subscriber, %session_id, "subscriber left session group");
        }
        self.send_to(subscriber, TelemetryEvent::SessionLeft { session_id });
        was_member
    }

    fn handle_publish(&mut self, event: TelemetryEvent) -> usize {
        let session_id = event.session_id();
        let members: Vec<SubscriberId> = match self.groups.get(&session_id) {
            Some(group) => group.iter().copied().collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for subscriber in members {
            if self.send_to(subscriber, event.clone()) {
                delivered += 1;
            }
        }
        tracing::trace!(%session_id, event = event.name(), delivered, "event published");
        delivered
    }

    /// Sends to one subscriber, pruning it if its receiver is gone.
    fn send_to(&mut self, subscriber: SubscriberId, event: TelemetryEvent) -> bool {
        let Some(entry) = self.subscribers.get(&subscriber) else {
            return false;
        };
        if entry.sender.send(event).is_ok() {
            return true;
        }
        tracing::debug!(%subscriber, "subscriber receiver closed, pruning");
        self.remove_subscriber(subscriber);
        false
    }

    fn remove_subscriber(&mut self, subscriber: SubscriberId) {
        let Some(entry) = self.subscribers.remove(&subscriber) else {
            return;
        };
        for session_id in &entry.sessions {
            self.drop_from_group(subscriber, *session_id);
        }
        tracing::debug!(%subscriber, groups = entry.sessions.len(), "subscriber removed from hub");
    }

    fn drop_from_group(&mut self, subscriber: SubscriberId, session_id: SessionId) {
        if let Some(group) = self.groups.get_mut(&session_id) {
            group.remove(&subscriber);
            if group.is_empty() {
                self.groups.remove(&session_id);
            }
        }
    }
}
