//! The page-side actor. It feeds DOM input into the gesture machine, carries
//! out the resulting effects on the page, and forwards requests to the
//! reactor.

mod gesture;
mod keys;

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub use self::gesture::{
    ClickState, DOUBLE_CLICK_WINDOW, Disposition, Effect, FOCUS_GUARD, GestureMachine,
    GestureSettings, MASK_SETTLE_DELAY, Outcome, SINGLE_CLICK_DELAY,
};
pub use self::keys::{KEY_REPEAT_WINDOW, KeyRepeatDetector, Modifiers};
use crate::actor::{self, reactor};
use crate::common::collections::HashMap;
use crate::common::config::Config;
use crate::model::geometry::Point;
use crate::model::message::{MessageSender, Request};
use crate::sys::page::PageSurface;
use crate::ui::action_icon::Theme;
use crate::ui::overlay::click_mask_css;

/// DOM input as seen by the page.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// `link` is the href of the closest enclosing anchor, if any.
    PointerDown { link: Option<String> },
    Click { link: Option<String>, pointer: Point },
    KeyDown { key: String, modifiers: Modifiers },
    FocusGained,
    /// A scroll gesture on the page settled.
    ScrollEnd,
    LocationChanged(String),
}

#[derive(Debug)]
pub enum Event {
    Input(Input),
    ConfigUpdated(Config),
}

pub type Sender = actor::Sender<Event>;
pub type Receiver = actor::Receiver<Event>;

#[derive(Debug, Clone, Copy)]
enum Timer {
    SingleClick(u64),
    RemoveMask,
}

pub struct EventTap<P> {
    surface: P,
    machine: GestureMachine,
    identity: MessageSender,
    reactor_tx: reactor::Sender,
    click_timers: HashMap<u64, CancellationToken>,
    mask_timer: Option<CancellationToken>,
    timer_tx: mpsc::UnboundedSender<Timer>,
    timer_rx: mpsc::UnboundedReceiver<Timer>,
}

impl<P: PageSurface> EventTap<P> {
    /// `identity` is the window and tab this page lives in; it is attached to
    /// every request.
    pub fn new(
        surface: P,
        config: &Config,
        identity: MessageSender,
        reactor_tx: reactor::Sender,
    ) -> Self {
        let machine = GestureMachine::new(GestureSettings::from(config), &surface.location());
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        EventTap {
            surface,
            machine,
            identity,
            reactor_tx,
            click_timers: HashMap::default(),
            mask_timer: None,
            timer_tx,
            timer_rx,
        }
    }

    pub fn machine(&self) -> &GestureMachine { &self.machine }

    pub fn surface(&self) -> &P { &self.surface }

    pub async fn run(mut self, mut events: Receiver) {
        loop {
            tokio::select! {
                Some(timer) = self.timer_rx.recv() => self.handle_timer(timer),
                maybe = events.recv() => match maybe {
                    Some((span, event)) => {
                        let _enter = span.enter();
                        self.handle_event(event);
                    }
                    None => break,
                },
            }
        }
        for (_, timer) in self.click_timers.drain() {
            timer.cancel();
        }
        debug!("event tap stopped");
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Input(input) => {
                self.handle_input(input);
            }
            Event::ConfigUpdated(config) => self.handle_config_updated(&config),
        }
    }

    /// Handles one input synchronously; the caller must honour the returned
    /// disposition before the page acts on the input.
    pub fn handle_input(&mut self, input: Input) -> Disposition {
        let now = Instant::now();
        let outcome = match input {
            Input::PointerDown { link } => self.machine.pointer_down(link.as_deref(), now),
            Input::Click { link, pointer } => self.machine.click(link.as_deref(), pointer, now),
            Input::KeyDown { key, modifiers } => self.machine.key_down(&key, modifiers, now),
            Input::FocusGained => self.machine.focus_gained(now),
            Input::ScrollEnd => self.machine.scroll_end(),
            Input::LocationChanged(location) => self.machine.location_changed(&location),
        };
        self.apply(outcome.effects);
        outcome.disposition
    }

    pub fn handle_config_updated(&mut self, config: &Config) {
        let location = self.surface.location();
        let outcome = self.machine.reconfigure(GestureSettings::from(config), &location);
        self.apply(outcome.effects);
    }

    /// Handles timers that have already expired without waiting for more.
    pub fn process_expired_timers(&mut self) {
        while let Ok(timer) = self.timer_rx.try_recv() {
            self.handle_timer(timer);
        }
    }

    fn handle_timer(&mut self, timer: Timer) {
        match timer {
            Timer::SingleClick(token) => {
                self.click_timers.remove(&token);
                let outcome = self.machine.timer_fired(token, Instant::now());
                self.apply(outcome.effects);
            }
            Timer::RemoveMask => {
                self.mask_timer = None;
                self.surface.remove_click_mask();
            }
        }
    }

    fn spawn_timer(&self, timer: Timer, delay: Duration) -> CancellationToken {
        let cancel = CancellationToken::new();
        let cancelled = cancel.clone();
        let tx = self.timer_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(timer);
                }
            }
        });
        cancel
    }

    fn send(&self, request: Request) {
        trace!(action = request.action(), "sending request");
        self.reactor_tx.send(reactor::Event::Message {
            request,
            sender: self.identity.clone(),
            resp: None,
        });
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Send(request) => self.send(request),
                Effect::RequestPreview { link, pointer } => {
                    let screen = self.surface.available_screen();
                    self.send(Request::open_preview(link, pointer, screen));
                }
                Effect::UpdateIcon => self.send(Request::UpdateIcon {
                    theme: Theme::from_prefers_dark(self.surface.prefers_dark()),
                    preview_mode: Some(self.machine.preview_mode()),
                }),
                Effect::ArmTimer { token, delay } => {
                    let timer = self.spawn_timer(Timer::SingleClick(token), delay);
                    if let Some(old) = self.click_timers.insert(token, timer) {
                        old.cancel();
                    }
                }
                Effect::CancelTimer { token } => {
                    if let Some(timer) = self.click_timers.remove(&token) {
                        timer.cancel();
                    }
                }
                Effect::Redispatch(link) => self.surface.redispatch_click(&link),
                Effect::ApplyBlur(style) => self.surface.apply_blur(&style.layer_style()),
                Effect::RemoveBlur => self.surface.remove_blur(),
                Effect::ApplyClickMask => {
                    if let Some(pending) = self.mask_timer.take() {
                        pending.cancel();
                    }
                    self.surface.apply_click_mask(&click_mask_css());
                }
                Effect::RemoveClickMask { after } => {
                    let timer = self.spawn_timer(Timer::RemoveMask, after);
                    if let Some(old) = self.mask_timer.replace(timer) {
                        old.cancel();
                    }
                }
                Effect::ClearSelection => self.surface.clear_selection(),
            }
        }
    }
}
