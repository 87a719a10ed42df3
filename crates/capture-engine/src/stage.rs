//! The slide on stage and its current snapshot.
//!
//! Every change to the deck, theme, slide index or footer flag schedules a
//! debounced rasterization. At most one pass runs at a time; changes that
//! arrive while a pass is running cause exactly one follow-up pass. Results
//! are published with the state generation they were rendered from, and an
//! older generation never replaces a newer one.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokslides_project_model::slide::{parse_deck, Slide, SlideLayout};
use tokslides_project_model::theme::Theme;
use tokslides_render_engine::{Rasterizer, SlideSnapshot, SlideSurface, CANVAS_HEIGHT, CANVAS_WIDTH};
use tracing::{debug, trace};

/// Delay between the last change and the rasterization it triggers.
pub const DEFAULT_SNAPSHOT_DEBOUNCE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Default)]
struct Published {
    generation: u64,
    snapshot: Option<Arc<SlideSnapshot>>,
}

/// Holder of the one current slide snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotCell {
    tx: Arc<watch::Sender<Published>>,
}

impl Default for SnapshotCell {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Published::default());
        Self { tx: Arc::new(tx) }
    }

    /// Current snapshot, if any has been published.
    pub fn current(&self) -> Option<Arc<SlideSnapshot>> {
        self.tx.borrow().snapshot.clone()
    }

    /// Publish unless a snapshot from a newer generation is already current.
    pub fn publish(&self, generation: u64, snapshot: Arc<SlideSnapshot>) -> bool {
        self.tx.send_if_modified(|published| {
            if published.snapshot.is_some() && generation < published.generation {
                return false;
            }
            published.generation = generation;
            published.snapshot = Some(snapshot);
            true
        })
    }

    /// Resolve after the next publication.
    pub async fn changed(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.changed().await;
    }
}

/// Output size and debounce of a [`SlideStage`].
#[derive(Debug, Clone, Copy)]
pub struct StageConfig {
    pub width: u32,
    pub height: u32,
    pub debounce: Duration,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            width: CANVAS_WIDTH,
            height: CANVAS_HEIGHT,
            debounce: DEFAULT_SNAPSHOT_DEBOUNCE,
        }
    }
}

struct StageState {
    slides: Vec<Slide>,
    theme: Theme,
    index: usize,
    show_footer: bool,
    generation: u64,
    timer: Option<JoinHandle<()>>,
    timer_seq: u64,
    in_flight: bool,
    dirty: bool,
}

struct StageInner {
    rasterizer: Rasterizer,
    cell: SnapshotCell,
    config: StageConfig,
    state: Mutex<StageState>,
}

/// Deck navigation plus debounced snapshotting. Clones share state.
#[derive(Clone)]
pub struct SlideStage {
    inner: Arc<StageInner>,
}

impl SlideStage {
    pub fn new(rasterizer: Rasterizer, theme: Theme, config: StageConfig) -> Self {
        Self {
            inner: Arc::new(StageInner {
                rasterizer,
                cell: SnapshotCell::new(),
                config,
                state: Mutex::new(StageState {
                    slides: Vec::new(),
                    theme,
                    index: 0,
                    show_footer: true,
                    generation: 0,
                    timer: None,
                    timer_seq: 0,
                    in_flight: false,
                    dirty: false,
                }),
            }),
        }
    }

    pub fn snapshots(&self) -> SnapshotCell {
        self.inner.cell.clone()
    }

    pub fn config(&self) -> StageConfig {
        self.inner.config
    }

    pub fn set_markdown(&self, markdown: &str) {
        self.set_slides(parse_deck(markdown));
    }

    /// Replace the deck, keeping the index inside it.
    pub fn set_slides(&self, slides: Vec<Slide>) {
        self.mutate(|state| {
            state.index = state.index.min(slides.len().saturating_sub(1));
            state.slides = slides;
            true
        });
    }

    pub fn set_theme(&self, theme: Theme) {
        self.mutate(|state| {
            let changed = state.theme != theme;
            state.theme = theme;
            changed
        });
    }

    pub fn set_show_footer(&self, show: bool) {
        self.mutate(|state| {
            let changed = state.show_footer != show;
            state.show_footer = show;
            changed
        });
    }

    pub fn toggle_footer(&self) -> bool {
        let show = !self.lock().show_footer;
        self.set_show_footer(show);
        show
    }

    /// Advance one slide, stopping at the last.
    pub fn next(&self) -> usize {
        self.go_to(self.index().saturating_add(1))
    }

    /// Go back one slide, stopping at the first.
    pub fn prev(&self) -> usize {
        self.go_to(self.index().saturating_sub(1))
    }

    /// Jump to `index`, clamped into the deck. Returns the new index.
    pub fn go_to(&self, index: usize) -> usize {
        let mut target = 0;
        self.mutate(|state| {
            target = index.min(state.slides.len().saturating_sub(1));
            let changed = target != state.index;
            state.index = target;
            changed
        });
        target
    }

    pub fn index(&self) -> usize {
        self.lock().index
    }

    pub fn len(&self) -> usize {
        self.lock().slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().slides.is_empty()
    }

    pub fn theme(&self) -> Theme {
        self.lock().theme.clone()
    }

    /// The surface for the slide currently on stage.
    pub fn surface(&self) -> SlideSurface {
        surface_of(&self.lock())
    }

    /// Rasterize the current state immediately, cancelling any pending
    /// debounce. Resolves once the result has been offered to the cell.
    pub async fn rasterize_now(&self) -> Arc<SlideSnapshot> {
        let (surface, generation) = {
            let mut state = self.lock();
            cancel_timer(&mut state);
            (surface_of(&state), state.generation)
        };
        let config = self.inner.config;
        let snapshot = Arc::new(
            self.inner
                .rasterizer
                .rasterize(surface, config.width, config.height)
                .await,
        );
        self.inner.cell.publish(generation, snapshot.clone());
        snapshot
    }

    fn lock(&self) -> MutexGuard<'_, StageState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn mutate(&self, f: impl FnOnce(&mut StageState) -> bool) {
        let mut state = self.lock();
        if !f(&mut state) {
            return;
        }
        state.generation += 1;
        self.schedule(&mut state);
    }

    /// Restart the debounce timer.
    fn schedule(&self, state: &mut StageState) {
        cancel_timer(state);
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime, snapshot deferred until rasterize_now");
            return;
        };
        let stage = self.clone();
        let delay = self.inner.config.debounce;
        let seq = state.timer_seq;
        state.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            stage.run_passes(seq).await;
        }));
    }

    async fn run_passes(&self, seq: u64) {
        {
            let mut state = self.lock();
            // A newer change or a forced pass superseded this timer.
            if state.timer_seq != seq {
                return;
            }
            state.timer = None;
            if state.in_flight {
                state.dirty = true;
                trace!("Snapshot pass already running, marked dirty");
                return;
            }
            state.in_flight = true;
        }

        loop {
            let (surface, generation) = {
                let state = self.lock();
                (surface_of(&state), state.generation)
            };
            let config = self.inner.config;
            let snapshot = self
                .inner
                .rasterizer
                .rasterize(surface, config.width, config.height)
                .await;
            let published = self.inner.cell.publish(generation, Arc::new(snapshot));
            trace!(generation, published, "Snapshot pass finished");

            let mut state = self.lock();
            if state.dirty {
                state.dirty = false;
                continue;
            }
            state.in_flight = false;
            break;
        }
    }
}

fn cancel_timer(state: &mut StageState) {
    state.timer_seq += 1;
    if let Some(timer) = state.timer.take() {
        timer.abort();
    }
}

fn surface_of(state: &StageState) -> SlideSurface {
    let slide = state.slides.get(state.index).cloned().unwrap_or_else(|| Slide {
        id: "slide-0".to_string(),
        content: String::new(),
        layout: SlideLayout::default(),
    });
    SlideSurface::new(
        slide,
        state.theme.clone(),
        state.index,
        state.slides.len().max(1),
        state.show_footer,
    )
}
