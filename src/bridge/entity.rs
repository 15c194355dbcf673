use std::fmt;

/// lifecycle of the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// long running workers owned by the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Worker {
    Render,
    Ingest,
}

impl fmt::Display for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Worker::Render => write!(f, "dmx render"),
            Worker::Ingest => write!(f, "art-net ingest"),
        }
    }
}

/// events that move a running bridge to `Stopping`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeEvent {
    // external interrupt, e.g. ctrl-c
    Interrupted,
    // a worker returned on its own, normally because of a fatal error
    WorkerExited(Worker),
}
