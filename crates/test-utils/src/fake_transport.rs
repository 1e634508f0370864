use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hopdag::errors::{HopdagError, Result};
use hopdag::node::Node;
use hopdag::transport::{BoxFuture, CommandOutcome, Session, SessionRef, Transport};
use hopdag::types::Direction;

/// Something the fake transport observed, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeEvent {
    Connected(String),
    /// A script include was shipped to the node.
    Shipped(String),
    Started(String),
    Finished(String),
    /// The command future was dropped before finishing (cancellation).
    Dropped(String),
}

#[derive(Debug, Clone)]
enum Behaviour {
    Succeed,
    Fail(String),
    Hang,
}

#[derive(Debug, Clone)]
struct Rule {
    behaviour: Behaviour,
    delay: Duration,
}

impl Default for Rule {
    fn default() -> Self {
        Self {
            behaviour: Behaviour::Succeed,
            delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    rules: Mutex<HashMap<String, Rule>>,
    unreachable: Mutex<HashSet<String>>,
    events: Mutex<Vec<FakeEvent>>,
}

impl FakeState {
    fn push(&self, event: FakeEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn rule(&self, key: &str) -> Rule {
        self.rules.lock().unwrap().get(key).cloned().unwrap_or_default()
    }
}

/// Instrumented in-memory transport.
///
/// Commands are keyed by their text: `run_text("x")` is `"x"`, scripts are
/// `"script:<path>"`, inline scripts are `"inline:<body>"`, transfers are
/// `"pull:<remote>"` / `"push:<remote>"`.
/// Unconfigured commands succeed immediately with their key as output.
/// Every connection, start, finish and drop lands in a shared event log.
#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    state: Arc<FakeState>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(self, key: &str, error: &str) -> Self {
        self.update(key, |r| r.behaviour = Behaviour::Fail(error.to_string()));
        self
    }

    /// Never completes; only cancellation ends it.
    pub fn hang_on(self, key: &str) -> Self {
        self.update(key, |r| r.behaviour = Behaviour::Hang);
        self
    }

    pub fn delay_on(self, key: &str, delay: Duration) -> Self {
        self.update(key, |r| r.delay = delay);
        self
    }

    /// Connecting to `host` fails.
    pub fn unreachable(self, host: &str) -> Self {
        self.state.unreachable.lock().unwrap().insert(host.to_string());
        self
    }

    fn update(&self, key: &str, f: impl FnOnce(&mut Rule)) {
        let mut rules = self.state.rules.lock().unwrap();
        f(rules.entry(key.to_string()).or_default());
    }

    pub fn events(&self) -> Vec<FakeEvent> {
        self.state.events.lock().unwrap().clone()
    }

    /// Keys of every command issued, in start order.
    pub fn started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                FakeEvent::Started(k) => Some(k),
                _ => None,
            })
            .collect()
    }

    pub fn dropped(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                FakeEvent::Dropped(k) => Some(k),
                _ => None,
            })
            .collect()
    }

    pub fn connections(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                FakeEvent::Connected(k) => Some(k),
                _ => None,
            })
            .collect()
    }

    /// Position of an event in the log, if it happened.
    pub fn position(&self, event: &FakeEvent) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }
}

impl Transport for FakeTransport {
    fn connect<'a>(
        &'a self,
        node: &'a Node,
        via: Option<SessionRef>,
    ) -> BoxFuture<'a, Result<SessionRef>> {
        Box::pin(async move {
            if self.state.unreachable.lock().unwrap().contains(node.host()) {
                return Err(HopdagError::Connection(format!(
                    "{} is unreachable",
                    node.destination()
                )));
            }
            let mut hops = via.map(|v| v.hops()).unwrap_or_default();
            hops.push(node.destination());
            self.state.push(FakeEvent::Connected(hops.join(" -> ")));
            let session: SessionRef = Arc::new(FakeSession {
                hops,
                state: Arc::clone(&self.state),
            });
            Ok(session)
        })
    }
}

#[derive(Debug)]
struct FakeSession {
    hops: Vec<String>,
    state: Arc<FakeState>,
}

/// Records `Dropped` unless disarmed by a normal finish.
struct DropGuard {
    key: String,
    state: Arc<FakeState>,
    armed: bool,
}

impl Drop for DropGuard {
    fn drop(&mut self) {
        if self.armed {
            self.state.push(FakeEvent::Dropped(self.key.clone()));
        }
    }
}

impl FakeSession {
    fn perform(&self, key: String) -> BoxFuture<'_, CommandOutcome> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            state.push(FakeEvent::Started(key.clone()));
            let mut guard = DropGuard {
                key: key.clone(),
                state: Arc::clone(&state),
                armed: true,
            };

            let rule = state.rule(&key);
            if !rule.delay.is_zero() {
                tokio::time::sleep(rule.delay).await;
            }
            let outcome = match rule.behaviour {
                Behaviour::Succeed => CommandOutcome::succeeded(format!("{key}\n")),
                Behaviour::Fail(error) => CommandOutcome::failed(format!("{key}\n"), error),
                Behaviour::Hang => std::future::pending().await,
            };

            guard.armed = false;
            state.push(FakeEvent::Finished(key));
            outcome
        })
    }
}

impl Session for FakeSession {
    fn describe(&self) -> String {
        format!("fake {}", self.hops.join(" -> "))
    }

    fn hops(&self) -> Vec<String> {
        self.hops.clone()
    }

    fn run_text<'a>(&'a self, command: &'a str) -> BoxFuture<'a, CommandOutcome> {
        self.perform(command.to_string())
    }

    fn run_script<'a>(
        &'a self,
        path: &'a Path,
        _args: &'a [String],
        includes: &'a [PathBuf],
    ) -> BoxFuture<'a, CommandOutcome> {
        for include in includes {
            self.state.push(FakeEvent::Shipped(include.display().to_string()));
        }
        self.perform(format!("script:{}", path.display()))
    }

    fn run_string<'a>(&'a self, body: &'a str, _args: &'a [String]) -> BoxFuture<'a, CommandOutcome> {
        self.perform(format!("inline:{body}"))
    }

    fn transfer<'a>(
        &'a self,
        direction: Direction,
        remote: &'a str,
        _local: &'a Path,
    ) -> BoxFuture<'a, CommandOutcome> {
        self.perform(format!("{direction}:{remote}"))
    }
}
