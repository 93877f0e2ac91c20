//! Model of the state machine that runs in the browser.
//!
//! Every delayed script block emitted by [`crate::deferred`] contains a tiny
//! state machine. It is described here as plain Rust so the behaviour can be
//! reasoned about and tested without a browser, and so the listener table
//! used by the template and by the model is the same value.
//!
//! ```text
//! Idle --load--> Armed --timer | touchstart | mouseenter | click | 2nd scroll--> Fired
//! ```
//!
//! `Fired` is terminal. Entering it clears the timer, removes every trigger
//! listener and runs the payload once, guarded by a latch.

use serde::Serialize;

use crate::core::{Delay, Trigger};

/// Object the listener is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Target {
    #[serde(rename = "window")]
    Window,
    #[serde(rename = "document.body")]
    Body,
}

/// Function invoked by the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Handler {
    /// Fires immediately.
    #[serde(rename = "load")]
    Load,
    /// Swallows the first scroll, fires on the next one.
    #[serde(rename = "scrollHandler")]
    Scroll,
}

/// DOM events that can trigger a payload in interaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DomEvent {
    #[serde(rename = "touchstart")]
    TouchStart,
    #[serde(rename = "mouseenter")]
    MouseEnter,
    #[serde(rename = "click")]
    Click,
    #[serde(rename = "scroll")]
    Scroll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Listener {
    pub target: Target,
    pub event: DomEvent,
    pub handler: Handler,
}

/// Listeners attached when the machine is armed in interaction mode.
pub const LISTENERS: [Listener; 4] = [
    Listener {
        target: Target::Window,
        event: DomEvent::TouchStart,
        handler: Handler::Load,
    },
    Listener {
        target: Target::Body,
        event: DomEvent::MouseEnter,
        handler: Handler::Load,
    },
    Listener {
        target: Target::Body,
        event: DomEvent::Click,
        handler: Handler::Load,
    },
    Listener {
        target: Target::Window,
        event: DomEvent::Scroll,
        handler: Handler::Scroll,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Armed,
    Fired,
}

/// Inputs delivered by the browser event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The window `load` event.
    Load,
    /// The timer started on arming expired.
    Timer,
    /// A DOM event reached one of the attached listeners.
    Dom(DomEvent),
}

/// Observable side effects of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    StartTimer(u64),
    Attach(Listener),
    ClearTimer,
    Detach(Listener),
    Execute,
}

#[derive(Debug, Clone)]
pub struct Machine {
    trigger: Trigger,
    state: State,
    loaded: bool,
    scrolled: bool,
}

impl Machine {
    pub fn new(delay: Delay) -> Self {
        Self {
            trigger: delay.trigger(),
            state: State::Idle,
            loaded: false,
            scrolled: false,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Feed one event into the machine and return the effects it causes.
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        match (self.state, event) {
            (State::Idle, Event::Load) => self.arm(),
            (State::Armed, Event::Timer) => match self.trigger {
                Trigger::Timer(_) => self.fire(),
                Trigger::Interaction => vec![],
            },
            (State::Armed, Event::Dom(dom)) => match self.trigger {
                // No listeners are attached in timer mode.
                Trigger::Timer(_) => vec![],
                Trigger::Interaction => self.interact(dom),
            },
            _ => vec![],
        }
    }

    fn arm(&mut self) -> Vec<Effect> {
        self.state = State::Armed;

        match self.trigger {
            Trigger::Timer(ms) => vec![Effect::StartTimer(ms)],
            Trigger::Interaction => LISTENERS.iter().copied().map(Effect::Attach).collect(),
        }
    }

    fn interact(&mut self, event: DomEvent) -> Vec<Effect> {
        let Some(listener) = LISTENERS.iter().find(|l| l.event == event) else {
            return vec![];
        };

        match listener.handler {
            Handler::Scroll if !self.scrolled => {
                self.scrolled = true;
                vec![]
            }
            _ => self.fire(),
        }
    }

    fn fire(&mut self) -> Vec<Effect> {
        if self.loaded {
            return vec![];
        }

        self.loaded = true;
        self.state = State::Fired;

        let mut effects = vec![Effect::ClearTimer];
        effects.extend(LISTENERS.iter().copied().map(Effect::Detach));
        effects.push(Effect::Execute);
        effects
    }
}
