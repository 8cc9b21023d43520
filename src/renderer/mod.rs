//! Rasterizer backends and the frame driver.

mod constants;
pub(crate) mod cpu;
mod driver;
mod renderer;
pub(crate) mod tiles;
mod types;


pub use cpu::CpuRenderer;
pub use driver::FrameDriver;
pub use renderer::GpuRenderer;
pub use tiles::BinScratch;
pub use types::{Backend, BackendKind, Frame, RenderError, RenderOptions, RenderStats};
