//! TokSlides Project Model
//!
//! Data contracts shared by the render and capture engines:
//! - **Slides:** markdown decks split into slides with a content layout
//! - **Themes:** colours, backgrounds and typography applied before rasterizing
//! - **Placement:** camera overlay position, scale and shape
//! - **Projects:** persisted deck + theme records
//! - **Assets:** content-addressed image blobs referenced as `local://<id>`

pub mod assets;
pub mod placement;
pub mod project;
pub mod slide;
pub mod theme;

pub use assets::*;
pub use placement::*;
pub use project::*;
pub use slide::*;
pub use theme::*;
