mod app_paths;

pub use app_paths::AppPaths;
