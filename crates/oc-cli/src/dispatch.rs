//! Event dispatch.
//!
//! Maps each watch event to a command and runs it under a
//! [`TimeoutArbiter`]. Different commands run concurrently; a command that is
//! still running when it is triggered again is requeued instead of started
//! twice.

use std::time::Duration;

use camino::Utf8PathBuf;
use oc_exec::{ExecError, TimeoutArbiter};
use oc_watch::{Event, Notify};
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::template::Template;

/// Delay before a trigger for an already-running command is retried.
pub const REQUEUE_DELAY: Duration = Duration::from_millis(100);

type Finished = Result<(Id, Result<(), ExecError>), JoinError>;

/// Runs commands for watch events.
#[derive(Debug)]
pub struct Dispatcher {
    template: Option<Template>,
    arbiter: TimeoutArbiter,
    cwd: Utf8PathBuf,
    running: FxHashSet<String>,
    commands: FxHashMap<Id, String>,
    tasks: JoinSet<Result<(), ExecError>>,
}

impl Dispatcher {
    /// Creates a dispatcher. Without a template, events are only logged.
    pub fn new(template: Option<Template>, arbiter: TimeoutArbiter, cwd: Utf8PathBuf) -> Self {
        Self {
            template,
            arbiter,
            cwd,
            running: FxHashSet::default(),
            commands: FxHashMap::default(),
            tasks: JoinSet::new(),
        }
    }

    /// Processes events until the engine stops or `shutdown` fires, then
    /// waits for running commands.
    pub async fn run(mut self, mut notify: Notify, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    info!("Shutting down");
                    break;
                }
                Some(joined) = self.tasks.join_next_with_id(), if !self.tasks.is_empty() => {
                    self.on_finished(joined);
                }
                event = notify.events.recv() => match event {
                    Some(event) => self.on_event(&notify, event),
                    None => {
                        debug!("Events channel closed");
                        break;
                    }
                },
                Some(error) = notify.errors.recv() => {
                    warn!(error = %error, "Watch error");
                }
            }
        }

        notify.close();

        if !self.tasks.is_empty() {
            info!(running = self.tasks.len(), "Waiting for running commands");
        }
        while let Some(joined) = self.tasks.join_next_with_id().await {
            self.on_finished(joined);
        }
    }

    /// Resolves the command for `event`, if any.
    fn command_for(&self, event: &Event) -> Option<String> {
        if event.is_requeued() {
            return Some(event.identifier.clone());
        }
        let path = event.path()?;
        self.template
            .as_ref()
            .map(|template| template.render(path, &self.cwd))
    }

    fn on_event(&mut self, notify: &Notify, event: Event) {
        info!(
            file = %event.identifier,
            count = event.count,
            kind = event.kind.map_or("requeued", |kind| kind.label()),
            "Change detected"
        );

        let Some(command) = self.command_for(&event) else {
            return;
        };

        if self.running.contains(&command) {
            debug!(command = %command, "Command still running, requeueing");
            notify.requeue(Event::new(command, event.count), REQUEUE_DELAY);
            return;
        }

        self.spawn(command);
    }

    fn spawn(&mut self, command: String) {
        info!(command = %command, "Running command");
        self.running.insert(command.clone());

        let arbiter = self.arbiter.clone();
        let task = self.tasks.spawn({
            let command = command.clone();
            async move { arbiter.run(&command).await }
        });
        self.commands.insert(task.id(), command);
    }

    /// Releases the command of a joined task, whether it finished or not.
    fn on_finished(&mut self, joined: Finished) {
        let id = match &joined {
            Ok((id, _)) => *id,
            Err(join) => join.id(),
        };
        let Some(command) = self.commands.remove(&id) else {
            return;
        };
        self.running.remove(&command);

        let result = match joined {
            Ok((_, result)) => result,
            Err(join) => {
                error!(command = %command, error = %join, "Command task failed");
                return;
            }
        };

        match result {
            Ok(()) => info!(command = %command, "Command finished"),
            Err(err) => report_failure(&command, &err),
        }
    }
}

fn report_failure(command: &str, err: &ExecError) {
    match err.interrupted() {
        Some(reason) => warn!(
            pid = err.pid(),
            reason = %reason,
            code = err.code(),
            command = %command,
            "Command interrupted"
        ),
        None => warn!(
            pid = err.pid(),
            command = %command,
            error = %err,
            "Command failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oc_core::{ExecConfig, WatchConfig};
    use oc_watch::ChangeKind;
    use tempfile::TempDir;
    use tokio::time::Instant;

    fn dispatcher(template: Option<&str>) -> Dispatcher {
        Dispatcher::new(
            template.map(Template::new),
            TimeoutArbiter::new(&ExecConfig::default()),
            Utf8PathBuf::from("/work"),
        )
    }

    #[test]
    fn test_requeued_event_runs_identifier() {
        let dispatcher = dispatcher(Some("ruby {{file}}"));
        let command = dispatcher.command_for(&Event::new("echo hi", 1));
        assert_eq!(command.as_deref(), Some("echo hi"));
    }

    #[test]
    fn test_file_event_renders_template() {
        let dispatcher = dispatcher(Some("ruby {{abs}}"));
        let event = Event::changed("lib/a.rb", 2, ChangeKind::Modify);
        assert_eq!(
            dispatcher.command_for(&event).as_deref(),
            Some("ruby /work/lib/a.rb")
        );
    }

    #[test]
    fn test_no_template_only_logs() {
        let dispatcher = dispatcher(None);
        let event = Event::changed("lib/a.rb", 1, ChangeKind::Modify);
        assert!(dispatcher.command_for(&event).is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_finished_command_is_no_longer_running() {
        let mut dispatcher = dispatcher(None);
        dispatcher.spawn("true".to_owned());
        assert!(dispatcher.running.contains("true"));

        let joined = dispatcher.tasks.join_next_with_id().await.expect("one task");
        dispatcher.on_finished(joined);
        assert!(!dispatcher.running.contains("true"));
        assert!(dispatcher.commands.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_aborted_command_is_released() {
        let mut dispatcher = dispatcher(None);
        dispatcher.spawn("sleep 0.2".to_owned());
        dispatcher.tasks.abort_all();

        let joined = dispatcher.tasks.join_next_with_id().await.expect("one task");
        assert!(joined.is_err());
        dispatcher.on_finished(joined);
        assert!(!dispatcher.running.contains("sleep 0.2"));
        assert!(dispatcher.commands.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_running_command_is_requeued_not_restarted() {
        let temp = TempDir::new().expect("Failed to create temp directory");
        let root = Utf8PathBuf::try_from(temp.path().to_owned()).expect("temp path is UTF-8");
        std::fs::write(root.join("a.rb"), "puts 1").expect("write");

        let mut notify = Notify::new(&[format!("{root}/*.rb")], &WatchConfig::default())
            .await
            .expect("engine starts");
        let mut dispatcher = dispatcher(None);

        dispatcher.spawn("sleep 0.3".to_owned());
        let started = Instant::now();
        dispatcher.on_event(&notify, Event::new("sleep 0.3", 1));
        assert_eq!(dispatcher.tasks.len(), 1);

        let requeued = tokio::time::timeout(Duration::from_secs(2), notify.events.recv())
            .await
            .expect("requeued in time")
            .expect("event");
        assert!(started.elapsed() >= REQUEUE_DELAY);
        assert!(requeued.is_requeued());
        assert_eq!(requeued.identifier, "sleep 0.3");
        assert_eq!(requeued.count, 1);

        // Still running, so the retry is deferred again.
        dispatcher.on_event(&notify, requeued);
        assert_eq!(dispatcher.tasks.len(), 1);

        let joined = dispatcher.tasks.join_next_with_id().await.expect("one task");
        dispatcher.on_finished(joined);
        dispatcher.on_event(&notify, Event::new("sleep 0.3", 1));
        assert_eq!(dispatcher.tasks.len(), 1);
        assert!(dispatcher.running.contains("sleep 0.3"));

        notify.close();
        dispatcher.tasks.abort_all();
    }
}
