pub mod app;
pub mod canvas;
pub mod components;
pub mod dom;
pub mod logger;
pub mod svg;
