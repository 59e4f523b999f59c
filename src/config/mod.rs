use lazy_static::lazy_static;
use std::sync::Arc;

#[derive(Clone)]
pub struct Config {
    pub prompt: String,
    pub max_args: usize,
    pub max_jobs: usize,
}

lazy_static! {
    pub static ref CONFIG: Arc<Config> = Arc::new(Config {
        prompt: ": ".to_string(),
        max_args: 512,
        max_jobs: 100,
    });
}
