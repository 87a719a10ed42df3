//! Render a single slide to PNG.

use std::path::PathBuf;

use anyhow::Context;
use tokslides_common::config::AppConfig;
use tokslides_project_model::parse_deck;
use tokslides_render_engine::frame::{CANVAS_HEIGHT, CANVAS_WIDTH};
use tokslides_render_engine::{Rasterizer, SlideSurface};

use super::deck;
use crate::DeckSource;

pub async fn run(
    config: &AppConfig,
    source: DeckSource,
    slide: usize,
    out: PathBuf,
) -> anyhow::Result<()> {
    let deck = deck::load(config, &source)?;
    let slides = parse_deck(&deck.markdown);
    let total = slides.len();
    let index = slide
        .checked_sub(1)
        .filter(|i| *i < total)
        .with_context(|| format!("slide {slide} out of range (deck has {total})"))?;

    let surface = SlideSurface::new(
        slides[index].clone(),
        deck.theme.clone(),
        index,
        total,
        !source.no_footer,
    );
    let rasterizer = Rasterizer::new(deck::renderer(config, &deck));
    let snapshot = rasterizer.rasterize(surface, CANVAS_WIDTH, CANVAS_HEIGHT).await;

    snapshot
        .save_png(&out)
        .with_context(|| format!("failed to write {}", out.display()))?;

    println!(
        "Slide {}/{} of '{}' ({}) -> {}",
        index + 1,
        total,
        deck.name,
        deck.theme.name,
        out.display()
    );
    if snapshot.is_degraded() {
        println!("  [WARN] Rendered with fallback fonts or a blank placeholder; see the log.");
    }
    Ok(())
}
