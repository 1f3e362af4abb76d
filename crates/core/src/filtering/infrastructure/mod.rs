pub mod cpu_filter_renderer;
mod gaussian;
