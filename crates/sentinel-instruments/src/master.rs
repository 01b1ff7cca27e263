//! Scrip master CSV and lookups over it.
//!
//! Only NSE, BSE and MCX rows are kept. Rows with an unparseable security
//! id are skipped; every other column is optional.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use sentinel_core::{Direction, InstrumentRef, Price, SecurityId, Segment};

use crate::error::{InstrumentError, InstrumentResult};

/// Maximum hits returned by [`ScripMaster::search`].
pub const SEARCH_LIMIT: usize = 10;

const COL_EXCHANGE: &str = "SEM_EXM_EXCH_ID";
const COL_SECURITY_ID: &str = "SEM_SMST_SECURITY_ID";
const COL_TRADING_SYMBOL: &str = "SEM_TRADING_SYMBOL";

/// Option instrument class for index options.
const OPTION_INDEX: &str = "OPTIDX";

#[derive(Debug, Deserialize)]
struct RawScrip {
    #[serde(rename = "SEM_EXM_EXCH_ID")]
    exchange: String,
    #[serde(rename = "SEM_SMST_SECURITY_ID")]
    security_id: String,
    #[serde(rename = "SEM_TRADING_SYMBOL")]
    trading_symbol: String,
    #[serde(rename = "SEM_INSTRUMENT_NAME", default)]
    instrument_name: String,
    #[serde(rename = "SEM_EXPIRY_DATE", default)]
    expiry_date: String,
    #[serde(rename = "SEM_STRIKE_PRICE", default)]
    strike_price: String,
    #[serde(rename = "SEM_OPTION_TYPE", default)]
    option_type: String,
}

/// Listing exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Exchange {
    Nse,
    Bse,
    Mcx,
}

impl Exchange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nse => "NSE",
            Self::Bse => "BSE",
            Self::Mcx => "MCX",
        }
    }
}

impl FromStr for Exchange {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NSE" => Ok(Self::Nse),
            "BSE" => Ok(Self::Bse),
            "MCX" => Ok(Self::Mcx),
            _ => Err(()),
        }
    }
}

/// Call or put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionType {
    Ce,
    Pe,
}

impl OptionType {
    /// Calls for BUY signals, puts for SELL.
    pub fn for_direction(direction: Direction) -> Self {
        match direction {
            Direction::Buy => Self::Ce,
            Direction::Sell => Self::Pe,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ce => "CE",
            Self::Pe => "PE",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "CE" => Some(Self::Ce),
            "PE" => Some(Self::Pe),
            _ => None,
        }
    }
}

/// One tradable instrument from the master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instrument {
    pub security_id: SecurityId,
    pub exchange: Exchange,
    /// Instrument class: `EQUITY`, `INDEX`, `OPTIDX`, `FUTCOM`...
    pub instrument_name: String,
    pub trading_symbol: String,
    pub expiry: Option<NaiveDate>,
    pub strike: Option<Decimal>,
    pub option_type: Option<OptionType>,
    #[serde(skip)]
    search_key: String,
}

impl Instrument {
    fn from_raw(raw: RawScrip) -> Option<Self> {
        let exchange = raw.exchange.parse::<Exchange>().ok()?;
        let security_id = raw.security_id.parse::<SecurityId>().ok()?;
        let strike = raw
            .strike_price
            .trim()
            .parse::<Decimal>()
            .ok()
            .filter(|s| s.is_sign_positive() && !s.is_zero())
            .map(|s| s.normalize());
        let expiry = raw
            .expiry_date
            .get(..10)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());

        Some(Self {
            security_id,
            exchange,
            instrument_name: raw.instrument_name.trim().to_ascii_uppercase(),
            search_key: raw.trading_symbol.to_uppercase(),
            trading_symbol: raw.trading_symbol,
            expiry,
            strike,
            option_type: OptionType::parse(&raw.option_type),
        })
    }

    /// Broker segment the instrument trades in.
    pub fn segment(&self) -> Segment {
        let name = self.instrument_name.as_str();
        match self.exchange {
            _ if name == "INDEX" => Segment::IdxI,
            Exchange::Mcx => Segment::McxComm,
            Exchange::Nse => match name {
                "EQUITY" => Segment::NseEq,
                "FUTCUR" | "OPTCUR" => Segment::NseCurrency,
                _ => Segment::NseFno,
            },
            Exchange::Bse => match name {
                "EQUITY" => Segment::BseEq,
                "FUTCUR" | "OPTCUR" => Segment::BseCurrency,
                _ => Segment::BseFno,
            },
        }
    }

    pub fn instrument_ref(&self) -> InstrumentRef {
        InstrumentRef::new(self.security_id, self.segment())
    }

    /// `RELIANCE (NSE)`.
    pub fn display(&self) -> String {
        format!("{} ({})", self.trading_symbol, self.exchange.as_str())
    }

    /// Underlying of a derivative symbol (`NIFTY` in `NIFTY-Mar2024-22500-CE`).
    pub fn underlying(&self) -> &str {
        self.search_key
            .split('-')
            .next()
            .unwrap_or(self.search_key.as_str())
    }
}

/// Strike spacing for an index: 100 for the bank index, 50 otherwise.
pub fn strike_step(index: &str) -> Decimal {
    if index.to_uppercase().contains("BANK") {
        Decimal::ONE_HUNDRED
    } else {
        Decimal::from(50)
    }
}

/// Spot rounded to the nearest strike; exact midpoints go to the even step.
pub fn atm_strike(index: &str, spot: Price) -> Decimal {
    let step = strike_step(index);
    (spot.inner() / step).round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven) * step
}

/// In-memory instrument master.
#[derive(Debug, Clone, Default)]
pub struct ScripMaster {
    instruments: Vec<Instrument>,
}

impl ScripMaster {
    /// Parse a scrip master CSV.
    pub fn from_reader<R: Read>(reader: R) -> InstrumentResult<Self> {
        let mut rows = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rows.headers()?.clone();
        for column in [COL_EXCHANGE, COL_SECURITY_ID, COL_TRADING_SYMBOL] {
            if !headers.iter().any(|h| h == column) {
                return Err(InstrumentError::MissingColumn(column.to_string()));
            }
        }

        let mut instruments = Vec::new();
        let mut skipped = 0usize;
        for (row, result) in rows.deserialize::<RawScrip>().enumerate() {
            let raw = match result {
                Ok(raw) => raw,
                Err(e) => {
                    debug!(row = row + 2, error = %e, "Skipping unreadable scrip row");
                    skipped += 1;
                    continue;
                }
            };
            if raw.exchange.parse::<Exchange>().is_err() {
                continue;
            }
            match Instrument::from_raw(raw) {
                Some(instrument) => instruments.push(instrument),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            debug!(skipped, "Scrip rows skipped");
        }
        Ok(Self { instruments })
    }

    /// Load the master from `path`.
    pub fn load(path: &Path) -> InstrumentResult<Self> {
        let file = File::open(path).map_err(|source| InstrumentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let master = Self::from_reader(BufReader::new(file))?;
        info!(path = %path.display(), count = master.len(), "Instruments loaded");
        Ok(master)
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    pub fn get(&self, security_id: SecurityId) -> Option<&Instrument> {
        self.instruments
            .iter()
            .find(|i| i.security_id == security_id)
    }

    /// First [`SEARCH_LIMIT`] instruments whose trading symbol contains
    /// `query`, case-insensitively, in master order.
    pub fn search(&self, query: &str) -> Vec<&Instrument> {
        let query = query.trim().to_uppercase();
        self.instruments
            .iter()
            .filter(|i| i.search_key.contains(&query))
            .take(SEARCH_LIMIT)
            .collect()
    }

    /// At-the-money index option for `spot`: calls for BUY, puts for SELL,
    /// nearest expiry on or after `today`.
    pub fn atm_option(
        &self,
        index: &str,
        spot: Price,
        direction: Direction,
        today: NaiveDate,
    ) -> InstrumentResult<&Instrument> {
        let underlying = index.trim().to_uppercase();
        let strike = atm_strike(&underlying, spot);
        let option_type = OptionType::for_direction(direction);

        self.instruments
            .iter()
            .filter(|i| {
                i.instrument_name == OPTION_INDEX
                    && i.underlying() == underlying
                    && i.strike == Some(strike)
                    && i.option_type == Some(option_type)
                    && i.expiry.is_some_and(|expiry| expiry >= today)
            })
            .min_by_key(|i| i.expiry)
            .ok_or_else(|| InstrumentError::NoAtmOption {
                index: underlying.clone(),
                strike,
                option_type: option_type.as_str().to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const MASTER: &str = "\
SEM_EXM_EXCH_ID,SEM_SEGMENT,SEM_SMST_SECURITY_ID,SEM_INSTRUMENT_NAME,SEM_TRADING_SYMBOL,SEM_EXPIRY_DATE,SEM_STRIKE_PRICE,SEM_OPTION_TYPE,SEM_LOT_UNITS
NSE,I,13,INDEX,NIFTY,,0,XX,1
NSE,I,25,INDEX,BANKNIFTY,,0,XX,1
NSE,E,2885,EQUITY,RELIANCE,,,XX,1
BSE,E,500325,EQUITY,RELIANCE,,,XX,1
NSE,D,40001,OPTIDX,NIFTY-Mar2024-22500-CE,2024-03-07 14:30:00,22500.00000,CE,50
NSE,D,40002,OPTIDX,NIFTY-Mar2024-22500-PE,2024-03-07 14:30:00,22500.00000,PE,50
NSE,D,40003,OPTIDX,NIFTY-Mar2024-22500-CE,2024-03-14 14:30:00,22500.00000,CE,50
NSE,D,40004,OPTIDX,NIFTY-Feb2024-22500-CE,2024-02-29 14:30:00,22500.00000,CE,50
NSE,D,40005,OPTIDX,BANKNIFTY-Mar2024-22500-CE,2024-03-06 14:30:00,22500.00000,CE,15
NSE,D,40006,OPTIDX,FINNIFTY-Mar2024-22500-CE,2024-03-05 14:30:00,22500.00000,CE,40
NSE,D,40007,OPTIDX,BANKNIFTY-Mar2024-47200-PE,2024-03-06 14:30:00,47200.00000,PE,15
NSE,D,40008,FUTIDX,NIFTY-Mar2024-FUT,2024-03-28 14:30:00,-0.01000,XX,50
MCX,M,234230,FUTCOM,CRUDEOIL-19Mar2024-FUT,2024-03-19 23:30:00,-0.01000,XX,100
NSE,C,10093,FUTCUR,USDINR-26Mar2024-FUT,2024-03-26 12:30:00,-0.01000,XX,1000
NCDEX,M,99,FUTCOM,GUARSEED,2024-03-20 17:00:00,-0.01000,XX,1
NSE,D,oops,OPTIDX,NIFTY-BROKEN,2024-03-07 14:30:00,22500,CE,50
";

    fn master() -> ScripMaster {
        ScripMaster::from_reader(MASTER.as_bytes()).unwrap()
    }

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn ids(hits: &[&Instrument]) -> Vec<u32> {
        hits.iter().map(|i| i.security_id.get()).collect()
    }

    #[test]
    fn test_load_keeps_supported_exchanges_and_valid_ids() {
        let master = master();
        assert_eq!(master.len(), 14);
        assert!(master.get(SecurityId::new(99)).is_none());

        let option = master.get(SecurityId::new(40001)).unwrap();
        assert_eq!(option.expiry, Some(day(3, 7)));
        assert_eq!(option.strike, Some(dec!(22500)));
        assert_eq!(option.option_type, Some(OptionType::Ce));

        let future = master.get(SecurityId::new(40008)).unwrap();
        assert_eq!(future.strike, None);
        assert_eq!(future.option_type, None);
    }

    #[test]
    fn test_missing_required_column_is_error() {
        let err = ScripMaster::from_reader("SEM_EXM_EXCH_ID,SEM_TRADING_SYMBOL\nNSE,X\n".as_bytes())
            .unwrap_err();
        assert!(matches!(err, InstrumentError::MissingColumn(c) if c == COL_SECURITY_ID));
    }

    #[test]
    fn test_segments() {
        let master = master();
        let segment = |id| master.get(SecurityId::new(id)).unwrap().segment();

        assert_eq!(segment(13), Segment::IdxI);
        assert_eq!(segment(2885), Segment::NseEq);
        assert_eq!(segment(500325), Segment::BseEq);
        assert_eq!(segment(40001), Segment::NseFno);
        assert_eq!(segment(234230), Segment::McxComm);
        assert_eq!(segment(10093), Segment::NseCurrency);
    }

    #[test]
    fn test_search_is_case_insensitive_in_master_order() {
        let master = master();

        let hits = master.search("reliance");
        assert_eq!(ids(&hits), vec![2885, 500325]);
        assert_eq!(hits[1].display(), "RELIANCE (BSE)");

        assert!(master.search("TATAMOTORS").is_empty());
    }

    #[test]
    fn test_search_is_capped() {
        let mut csv = String::from("SEM_EXM_EXCH_ID,SEM_SMST_SECURITY_ID,SEM_TRADING_SYMBOL\n");
        for id in 1..=25 {
            csv.push_str(&format!("NSE,{id},STOCK{id}\n"));
        }
        let master = ScripMaster::from_reader(csv.as_bytes()).unwrap();

        let hits = master.search("stock");
        assert_eq!(hits.len(), SEARCH_LIMIT);
        assert_eq!(hits[0].trading_symbol, "STOCK1");
    }

    #[test]
    fn test_atm_strike_rounding() {
        assert_eq!(atm_strike("NIFTY", Price::new(dec!(22512.5))), dec!(22500));
        assert_eq!(atm_strike("NIFTY", Price::new(dec!(22540))), dec!(22550));
        assert_eq!(atm_strike("NIFTY", Price::new(dec!(22525))), dec!(22500));
        assert_eq!(atm_strike("BankNifty", Price::new(dec!(47180))), dec!(47200));
        assert_eq!(strike_step("FINNIFTY"), dec!(50));
    }

    #[test]
    fn test_atm_picks_nearest_live_expiry() {
        let master = master();
        let spot = Price::new(dec!(22512.5));

        let call = master.atm_option("nifty", spot, Direction::Buy, day(3, 1)).unwrap();
        assert_eq!(call.security_id, SecurityId::new(40001));

        let put = master.atm_option("NIFTY", spot, Direction::Sell, day(3, 1)).unwrap();
        assert_eq!(put.security_id, SecurityId::new(40002));

        let next_week = master.atm_option("NIFTY", spot, Direction::Buy, day(3, 8)).unwrap();
        assert_eq!(next_week.security_id, SecurityId::new(40003));
        assert_eq!(next_week.instrument_ref().segment, Segment::NseFno);
    }

    #[test]
    fn test_atm_matches_the_exact_underlying() {
        let master = master();

        let bank = master
            .atm_option("BANKNIFTY", Price::new(dec!(47180)), Direction::Sell, day(3, 1))
            .unwrap();
        assert_eq!(bank.security_id, SecurityId::new(40007));

        let fin = master
            .atm_option("FINNIFTY", Price::new(dec!(22500)), Direction::Buy, day(3, 1))
            .unwrap();
        assert_eq!(fin.security_id, SecurityId::new(40006));
    }

    #[test]
    fn test_atm_without_match_is_error() {
        let master = master();

        let err = master
            .atm_option("NIFTY", Price::new(dec!(22512.5)), Direction::Sell, day(3, 8))
            .unwrap_err();
        assert!(matches!(
            err,
            InstrumentError::NoAtmOption { ref option_type, .. } if option_type == "PE"
        ));
    }
}
