//! Configurator session state machine
//!
//! Each session runs as a small actor: commands arrive on an mpsc channel,
//! research and image work run as spawned tasks that post an [`Event`] back,
//! and the current [`ConfiguratorSnapshot`] is published on a watch channel.
//!
//! Every selection gets a sequence number. An event whose number is no
//! longer current is dropped, so a slow answer for an earlier subject can
//! never overwrite a later one.
//!
//! Research text and the image settle independently: the snapshot turns
//! `Success` or `Error` as soon as research answers, and `image_url` is
//! filled once an image is resolved.

use std::sync::Arc;

use restomod_core::{
    ConfiguratorSnapshot, FallbackImageResolver, ImageStyle, ResearchQuery, ResearchResult,
    ResearchStatus, Subject,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::cache::ResearchCache;
use crate::imagegen::ImageSource;
use crate::research::ResearchError;

/// Called with the image URL once per committed selection.
pub type ImageObserver = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    Subject(#[from] restomod_core::Error),

    #[error("Configurator session closed")]
    Closed,
}

enum Command {
    Select {
        subject: Subject,
        style: ImageStyle,
        reply: oneshot::Sender<Result<u64, ControllerError>>,
    },
    Regenerate {
        reply: oneshot::Sender<Option<u64>>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
}

/// Results posted back to the actor by spawned tasks
enum Event {
    ResearchDone {
        seq: u64,
        outcome: Result<ResearchResult, ResearchError>,
    },
    ImageResolved {
        seq: u64,
        url: String,
    },
}

/// Everything a spawned task needs, cloned per selection.
#[derive(Clone)]
struct Collaborators {
    cache: ResearchCache,
    images: Option<Arc<dyn ImageSource>>,
    resolver: FallbackImageResolver,
}

impl Collaborators {
    /// Image available without I/O: the embedded one, or a curated one when
    /// research failed or no generator is configured. `None` means the
    /// generator has to be asked.
    fn immediate_image(
        &self,
        subject: &Subject,
        outcome: &Result<ResearchResult, ResearchError>,
    ) -> Option<String> {
        let Ok(result) = outcome else {
            return Some(self.resolver.resolve(subject));
        };

        if let Some(url) = result.image_url.as_deref().filter(|u| !u.trim().is_empty()) {
            return Some(url.to_string());
        }

        match self.images {
            Some(_) => None,
            None => Some(self.resolver.resolve(subject)),
        }
    }

    /// Generated image, or a curated one if generation fails.
    async fn generated_image(&self, subject: &Subject, style: ImageStyle) -> String {
        if let Some(images) = &self.images {
            match images.generate(subject, style).await {
                Ok(url) if !url.trim().is_empty() => return url,
                Ok(_) => warn!("Image generator returned an empty URL for {}", subject),
                Err(e) => warn!("Image generation failed for {}: {}", subject, e),
            }
        }
        self.resolver.resolve(subject)
    }
}

pub struct ConfiguratorController {
    deps: Collaborators,
    observer: Option<ImageObserver>,
    state: watch::Sender<ConfiguratorSnapshot>,
    events: mpsc::UnboundedSender<Event>,
    seq: u64,
    current: Option<(ResearchQuery, ImageStyle)>,
}

impl ConfiguratorController {
    /// Start a session actor and return its handle. The actor stops when
    /// every handle is dropped.
    pub fn spawn(
        cache: ResearchCache,
        images: Option<Arc<dyn ImageSource>>,
        resolver: FallbackImageResolver,
        observer: Option<ImageObserver>,
    ) -> ConfiguratorHandle {
        let (commands_tx, commands_rx) = mpsc::channel(32);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConfiguratorSnapshot::default());

        let controller = Self {
            deps: Collaborators {
                cache,
                images,
                resolver,
            },
            observer,
            state: state_tx,
            events: events_tx,
            seq: 0,
            current: None,
        };
        tokio::spawn(controller.run(commands_rx, events_rx));

        ConfiguratorHandle {
            commands: commands_tx,
            state: state_rx,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
                Some(event) = events.recv() => self.apply(event),
            }
        }
        debug!("Configurator session stopped");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Select {
                subject,
                style,
                reply,
            } => {
                let _ = reply.send(self.select(subject, style));
            }
            Command::Regenerate { reply } => {
                let _ = reply.send(self.regenerate());
            }
            Command::Reset { reply } => {
                self.reset();
                let _ = reply.send(());
            }
        }
    }

    fn select(&mut self, subject: Subject, style: ImageStyle) -> Result<u64, ControllerError> {
        let query = ResearchQuery::new(subject)?;
        self.seq += 1;
        self.current = Some((query.clone(), style));

        if let Some(result) = self.deps.cache.lookup(&query) {
            debug!("Serving {} from cache", query.cache_key());
            self.publish_terminal(Ok(result));
            return Ok(self.seq);
        }

        self.start_fetch(query, false);
        Ok(self.seq)
    }

    fn regenerate(&mut self) -> Option<u64> {
        let (query, _) = self.current.clone()?;
        self.seq += 1;
        info!("Regenerating research for {}", query.cache_key());
        self.start_fetch(query, true);
        Some(self.seq)
    }

    fn reset(&mut self) {
        self.seq += 1;
        self.current = None;
        let seq = self.seq;
        self.state.send_replace(ConfiguratorSnapshot {
            seq,
            ..ConfiguratorSnapshot::default()
        });
    }

    fn start_fetch(&mut self, query: ResearchQuery, force: bool) {
        let seq = self.seq;
        self.state.send_replace(ConfiguratorSnapshot {
            seq,
            subject: Some(query.subject().clone()),
            status: ResearchStatus::Loading,
            data: None,
            error: None,
            image_url: None,
        });

        let cache = self.deps.cache.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let outcome = if force {
                cache.refresh(&query).await
            } else {
                cache.get(&query).await
            };
            // The session may have been dropped meanwhile
            let _ = events.send(Event::ResearchDone { seq, outcome });
        });
    }

    fn apply(&mut self, event: Event) {
        match event {
            Event::ResearchDone { seq, outcome } => {
                if seq != self.seq {
                    debug!("Dropping stale research #{} (current #{})", seq, self.seq);
                    return;
                }
                self.publish_terminal(outcome);
            }
            Event::ImageResolved { seq, url } => {
                if seq != self.seq || self.state.borrow().image_url.is_some() {
                    debug!("Dropping stale image #{} (current #{})", seq, self.seq);
                    return;
                }
                self.notify_image(&url);
                self.state.send_modify(|s| s.image_url = Some(url));
            }
        }
    }

    /// Publish `Success` or `Error` for the current selection and start
    /// image resolution when it needs the generator.
    fn publish_terminal(&mut self, outcome: Result<ResearchResult, ResearchError>) {
        let Some((query, style)) = self.current.clone() else {
            return;
        };
        let subject = query.subject().clone();
        let image_url = self.deps.immediate_image(&subject, &outcome);

        let snapshot = match outcome {
            Ok(data) => ConfiguratorSnapshot {
                seq: self.seq,
                subject: Some(subject.clone()),
                status: ResearchStatus::Success,
                data: Some(data),
                error: None,
                image_url: image_url.clone(),
            },
            Err(e) => ConfiguratorSnapshot {
                seq: self.seq,
                subject: Some(subject.clone()),
                status: ResearchStatus::Error,
                data: None,
                error: Some(e.to_string()),
                image_url: image_url.clone(),
            },
        };

        match image_url {
            Some(url) => self.notify_image(&url),
            None => {
                let deps = self.deps.clone();
                let events = self.events.clone();
                let seq = self.seq;
                tokio::spawn(async move {
                    let url = deps.generated_image(&subject, style).await;
                    let _ = events.send(Event::ImageResolved { seq, url });
                });
            }
        }
        self.state.send_replace(snapshot);
    }

    // Runs before the snapshot carrying the image is published
    fn notify_image(&self, url: &str) {
        if let Some(observer) = &self.observer {
            observer(url);
        }
    }
}

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct ConfiguratorHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConfiguratorSnapshot>,
}

impl ConfiguratorHandle {
    /// Select a subject. Returns the sequence number of the selection.
    ///
    /// # Errors
    /// `ControllerError::Subject` for a blank subject (state unchanged), or
    /// `ControllerError::Closed` if the session is gone.
    pub async fn select(&self, subject: Subject, style: ImageStyle) -> Result<u64, ControllerError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Select {
                subject,
                style,
                reply,
            })
            .await
            .map_err(|_| ControllerError::Closed)?;
        rx.await.map_err(|_| ControllerError::Closed)?
    }

    /// Fetch the current subject again, bypassing the cache. `None` when
    /// nothing is selected.
    pub async fn regenerate(&self) -> Result<Option<u64>, ControllerError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Regenerate { reply })
            .await
            .map_err(|_| ControllerError::Closed)?;
        rx.await.map_err(|_| ControllerError::Closed)
    }

    /// Return to idle; anything in flight is discarded.
    pub async fn reset(&self) -> Result<(), ControllerError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Reset { reply })
            .await
            .map_err(|_| ControllerError::Closed)?;
        rx.await.map_err(|_| ControllerError::Closed)
    }

    pub fn snapshot(&self) -> ConfiguratorSnapshot {
        self.state.borrow().clone()
    }

    /// Wait until the session has moved past `seq` and is no longer loading.
    /// The image may still be on its way.
    pub async fn settled(&self, seq: u64) -> Result<ConfiguratorSnapshot, ControllerError> {
        self.wait_until(|s| s.seq >= seq && s.status != ResearchStatus::Loading)
            .await
    }

    /// Like [`settled`](Self::settled), but also waits for the image of a
    /// terminal state.
    pub async fn resolved(&self, seq: u64) -> Result<ConfiguratorSnapshot, ControllerError> {
        self.wait_until(|s| {
            s.seq >= seq
                && match s.status {
                    ResearchStatus::Loading => false,
                    ResearchStatus::Idle => true,
                    ResearchStatus::Success | ResearchStatus::Error => s.image_url.is_some(),
                }
        })
        .await
    }

    async fn wait_until(
        &self,
        ready: impl FnMut(&ConfiguratorSnapshot) -> bool,
    ) -> Result<ConfiguratorSnapshot, ControllerError> {
        let mut rx = self.state.clone();
        let snapshot = rx.wait_for(ready).await.map_err(|_| ControllerError::Closed)?;
        Ok(snapshot.clone())
    }
}
