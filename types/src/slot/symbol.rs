use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown symbol: {0}")]
pub struct UnknownSymbol(pub String);

/// Paying mahjong tiles, highest paying first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tile {
    Fa,
    Zhong,
    Bai,
    Bawan,
    Wutong,
    Wusuo,
    Santong,
    Ertong,
    Ersuo,
}

impl Tile {
    pub const ALL: [Tile; 9] = [
        Tile::Fa,
        Tile::Zhong,
        Tile::Bai,
        Tile::Bawan,
        Tile::Wutong,
        Tile::Wusuo,
        Tile::Santong,
        Tile::Ertong,
        Tile::Ersuo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Tile::Fa => "fa",
            Tile::Zhong => "zhong",
            Tile::Bai => "bai",
            Tile::Bawan => "bawan",
            Tile::Wutong => "wutong",
            Tile::Wusuo => "wusuo",
            Tile::Santong => "santong",
            Tile::Ertong => "ertong",
            Tile::Ersuo => "ersuo",
        }
    }
}

impl FromStr for Tile {
    type Err = UnknownSymbol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tile::ALL
            .into_iter()
            .find(|tile| tile.as_str() == s)
            .ok_or_else(|| UnknownSymbol(s.to_string()))
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A symbol as it appears on a reel strip or in a grid cell.
///
/// `Gold` is a cosmetic skin: it matches and pays exactly like its base tile.
/// Encoded as a string: `"wild"`, `"scatter"`, `"fa"`, `"gold_fa"`, ...
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Symbol {
    Wild,
    Scatter,
    Tile(Tile),
    Gold(Tile),
}

const GOLD_PREFIX: &str = "gold_";

impl Symbol {
    /// The tile this symbol pays as, ignoring gold skins. `None` for wild and scatter.
    pub fn base_tile(self) -> Option<Tile> {
        match self {
            Symbol::Tile(tile) | Symbol::Gold(tile) => Some(tile),
            Symbol::Wild | Symbol::Scatter => None,
        }
    }

    /// Collapse gold skins onto their base tile.
    pub fn normalized(self) -> Symbol {
        match self {
            Symbol::Gold(tile) => Symbol::Tile(tile),
            other => other,
        }
    }

    pub fn is_wild(self) -> bool {
        matches!(self, Symbol::Wild)
    }

    pub fn is_scatter(self) -> bool {
        matches!(self, Symbol::Scatter)
    }

    /// Whether this cell counts toward a ways win on `tile` (wild substitutes, scatter never).
    pub fn matches(self, tile: Tile) -> bool {
        self.is_wild() || self.base_tile() == Some(tile)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Wild => f.write_str("wild"),
            Symbol::Scatter => f.write_str("scatter"),
            Symbol::Tile(tile) => f.write_str(tile.as_str()),
            Symbol::Gold(tile) => write!(f, "{GOLD_PREFIX}{}", tile.as_str()),
        }
    }
}

impl FromStr for Symbol {
    type Err = UnknownSymbol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wild" => Ok(Symbol::Wild),
            "scatter" => Ok(Symbol::Scatter),
            _ => match s.strip_prefix(GOLD_PREFIX) {
                Some(base) => base
                    .parse()
                    .map(Symbol::Gold)
                    .map_err(|_| UnknownSymbol(s.to_string())),
                None => s.parse().map(Symbol::Tile),
            },
        }
    }
}

impl TryFrom<String> for Symbol {
    type Error = UnknownSymbol;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.to_string()
    }
}
