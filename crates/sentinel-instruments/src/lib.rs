//! Broker instrument master.
//!
//! Loads the broker's scrip master CSV and answers the two lookups trade
//! entry needs: free-text symbol search and "the at-the-money index option
//! for this spot and direction".

pub mod download;
pub mod error;
pub mod master;

pub use download::{download_master, DEFAULT_MASTER_URL};
pub use error::{InstrumentError, InstrumentResult};
pub use master::{
    atm_strike, strike_step, Exchange, Instrument, OptionType, ScripMaster, SEARCH_LIMIT,
};
