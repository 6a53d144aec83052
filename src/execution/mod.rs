// Price feed, rolling statistics, positions and order routing
pub mod position;
pub mod price_feed;
pub mod rolling_window;
pub mod router;
pub mod tracker;

pub use position::{Entry, Position, Realized};
pub use price_feed::{FeedConfig, PriceCache, PriceCacheEntry, PriceFeed, PriceProvider};
pub use rolling_window::RollingWindow;
pub use router::{
    BuyRequest, BuySize, ExecutionRouter, RouteOutcome, RouterConfig, SellAmount, SellRequest,
    SkipReason,
};
pub use tracker::{PriceListener, PriceTracker, TrackerRegistry};
