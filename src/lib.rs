pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod playlist;
pub mod render;
pub mod store;
pub mod platform {
    pub mod desktop;
}
pub mod processing {
    pub mod decode;
    pub mod fit;
    pub mod layout;
}
pub mod sinks {
    pub mod ambient;
    pub mod wallpaper;
}
pub mod tasks {
    pub mod control;
    pub mod files;
    pub mod periodic;
    pub mod scheduler;
    pub mod session;
}
