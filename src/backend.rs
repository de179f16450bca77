pub mod cameras;
pub mod capture;
pub mod export;
pub mod imaging;
pub mod live_clip;
pub mod pipeline;
pub mod render_take;
pub mod servers;
