#![forbid(unsafe_code)]

pub mod cli;
pub mod crawl;
pub mod extract;
pub mod formats;
pub mod links;
pub mod loader;
pub mod logging;
pub mod pipeline;
pub mod rank_comp;
pub mod scrub;
pub mod seeds;
pub mod selectors;
