pub mod issue;

pub use issue::{Comment, Issue, UNKNOWN_STATION};
