pub mod config;
pub mod db;
pub mod middleware;
pub mod state;
pub mod routes {
    pub mod health;
    pub mod screener;
    pub mod value_area;
}
pub mod services {
    pub mod candle_cache;
    pub mod market_data;
    pub mod scheduler;
    pub mod screener;
    pub mod sink;

    pub mod fvg {
        pub mod alignment;
        pub mod common;
        pub mod gap;
        pub mod setup;
        pub mod value_area;
        pub use alignment::{align, AlignedPair, AlignmentPolicy, AlignmentRules, Boundary};
        pub use common::{Candle, CandleSeries, GapKind, SeriesError, Timeframe};
        pub use gap::{detect, price_within_gaps, FillTracker, Fvg};
        pub use setup::{assemble, middle_candle, Setup};
        pub use value_area::{ValueArea, ValueAreaError};
    }
}

pub mod utils;
