//! Detection pipeline loops
//!
//! stream -> [`TriggerEvaluator`] -> queue -> [`WindowCounter`] -> alert channel,
//! with [`PriceRefresher`] and [`Housekeeper`] writing the same state store on
//! their own cadence.

pub mod counter;
pub mod evaluator;
pub mod housekeeper;
pub mod refresher;

pub use counter::{CounterOutcome, WindowCounter};
pub use evaluator::{Evaluation, TriggerEvaluator};
pub use housekeeper::{Housekeeper, HousekeepingReport};
pub use refresher::{PriceRefresher, RefreshReport};
