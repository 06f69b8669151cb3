//! Academic term decoding.
//!
//! A term code is `YYYYQQ`: the calendar year the academic year starts in,
//! then the quarter (01 fall, 02 winter, 03 spring, 04 summer). The academic
//! year a term counts toward is the start year for fall and the following
//! year for every other quarter, so `201401` (Fall 2014) and `201402`
//! (Winter 2015) land in 2014 and 2015.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Season {
    Fall = 1,
    Winter = 2,
    Spring = 3,
    Summer = 4,
}

impl Season {
    pub fn from_quarter(quarter: u8) -> Option<Self> {
        match quarter {
            1 => Some(Season::Fall),
            2 => Some(Season::Winter),
            3 => Some(Season::Spring),
            4 => Some(Season::Summer),
            _ => None,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "fall" | "autumn" => Some(Season::Fall),
            "winter" => Some(Season::Winter),
            "spring" => Some(Season::Spring),
            "summer" => Some(Season::Summer),
            _ => None,
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Season::Fall => "Fall",
            Season::Winter => "Winter",
            Season::Spring => "Spring",
            Season::Summer => "Summer",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermCode {
    pub calendar_year: i32,
    pub season: Season,
}

impl TermCode {
    /// Decodes a six-digit term code. Anything else, including quarters
    /// outside 1-4, is rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.len() != 6 || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let calendar_year = raw[..4].parse().ok()?;
        let season = Season::from_quarter(raw[4..].parse().ok()?)?;
        Some(TermCode {
            calendar_year,
            season,
        })
    }

    /// Decodes a label such as `"Winter 2015"` into the code it was printed
    /// from. The label carries the year the term actually falls in.
    pub fn from_label(label: &str) -> Option<Self> {
        let mut tokens = label.split_whitespace();
        let season = Season::from_name(tokens.next()?)?;
        let year: i32 = tokens.last()?.parse().ok()?;

        let calendar_year = match season {
            Season::Fall => year,
            _ => year - 1,
        };
        Some(TermCode {
            calendar_year,
            season,
        })
    }

    pub fn academic_year(self) -> i32 {
        match self.season {
            Season::Fall => self.calendar_year,
            Season::Winter | Season::Spring | Season::Summer => self.calendar_year + 1,
        }
    }

    /// Human label, e.g. `"Winter 2015"`.
    pub fn label(self) -> String {
        format!("{} {}", self.season, self.academic_year())
    }
}

impl fmt::Display for TermCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.calendar_year, self.season as u8)
    }
}
