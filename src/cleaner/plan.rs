//! Named sanitization standards as ordered pass lists

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Byte pattern written by one pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "pattern", content = "bytes", rename_all = "snake_case")]
pub enum PassPattern {
    /// 0x00 everywhere
    Zeros,
    /// 0xFF everywhere
    Ones,
    /// Repeating byte sequence anchored at offset zero
    Fixed(#[serde(with = "hex::serde")] Vec<u8>),
    /// Fresh CSPRNG output
    Random,
    /// Bitwise complement of the previous pass
    Complement,
}

impl PassPattern {
    pub fn is_deterministic(&self) -> bool {
        !matches!(self, PassPattern::Random)
    }
}

impl fmt::Display for PassPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassPattern::Zeros => f.write_str("zeros"),
            PassPattern::Ones => f.write_str("ones"),
            PassPattern::Fixed(bytes) => write!(f, "fixed:{}", hex::encode(bytes)),
            PassPattern::Random => f.write_str("random"),
            PassPattern::Complement => f.write_str("complement"),
        }
    }
}

/// One overwrite pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSpec {
    #[serde(flatten)]
    pub pattern: PassPattern,
    /// Read the file back and compare after the write is durable
    #[serde(default)]
    pub verify: bool,
}

impl PassSpec {
    pub fn verified(pattern: PassPattern) -> Self {
        Self { pattern, verify: true }
    }

    pub fn unverified(pattern: PassPattern) -> Self {
        Self { pattern, verify: false }
    }
}

/// Ordered, non-empty sequence of passes under a standard's name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WipePlan {
    pub name: String,
    pub passes: Vec<PassSpec>,
}

/// Names accepted by [`WipePlan::by_name`]
pub const PRESET_NAMES: [&str; 5] = [
    "nist-800-88-clear",
    "dod-5220.22-m",
    "dod-5220.22-m-ece",
    "gutmann",
    "rattlescan-legacy",
];

const GUTMANN_PATTERNS: [&[u8]; 27] = [
    &[0x55],
    &[0xAA],
    &[0x92, 0x49, 0x24],
    &[0x49, 0x24, 0x92],
    &[0x24, 0x92, 0x49],
    &[0x00],
    &[0x11],
    &[0x22],
    &[0x33],
    &[0x44],
    &[0x55],
    &[0x66],
    &[0x77],
    &[0x88],
    &[0x99],
    &[0xAA],
    &[0xBB],
    &[0xCC],
    &[0xDD],
    &[0xEE],
    &[0xFF],
    &[0x92, 0x49, 0x24],
    &[0x49, 0x24, 0x92],
    &[0x24, 0x92, 0x49],
    &[0x6D, 0xB6, 0xDB],
    &[0xB6, 0xDB, 0x6D],
    &[0xDB, 0x6D, 0xB6],
];

impl WipePlan {
    pub fn new(name: impl Into<String>, passes: Vec<PassSpec>) -> Result<Self> {
        let plan = Self {
            name: name.into(),
            passes,
        };
        plan.validate()?;
        Ok(plan)
    }

    pub fn validate(&self) -> Result<()> {
        let Some(first) = self.passes.first() else {
            return Err(Error::InvalidPlan(format!("plan '{}' has no passes", self.name)));
        };
        if first.pattern == PassPattern::Complement {
            return Err(Error::InvalidPlan(format!(
                "plan '{}' starts with a complement pass",
                self.name
            )));
        }
        if let Some(i) = self
            .passes
            .iter()
            .position(|p| matches!(&p.pattern, PassPattern::Fixed(b) if b.is_empty()))
        {
            return Err(Error::InvalidPlan(format!(
                "plan '{}' pass {} has an empty fixed pattern",
                self.name,
                i + 1
            )));
        }
        Ok(())
    }

    /// A plan counts as verified when at least one pass reads back
    pub fn is_verified(&self) -> bool {
        self.passes.iter().any(|p| p.verify)
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// NIST SP 800-88 Clear: one verified zero pass
    pub fn nist_800_88_clear() -> Self {
        Self {
            name: "nist-800-88-clear".into(),
            passes: vec![PassSpec::verified(PassPattern::Zeros)],
        }
    }

    /// DoD 5220.22-M: zeros, their complement, random; each verified
    pub fn dod_5220_22_m() -> Self {
        Self {
            name: "dod-5220.22-m".into(),
            passes: vec![
                PassSpec::verified(PassPattern::Zeros),
                PassSpec::verified(PassPattern::Complement),
                PassSpec::verified(PassPattern::Random),
            ],
        }
    }

    /// DoD 5220.22-M ECE: the three-pass sequence, a random pass, then the
    /// three-pass sequence again
    pub fn dod_5220_22_m_ece() -> Self {
        let mut passes = Self::dod_5220_22_m().passes;
        passes.push(PassSpec::verified(PassPattern::Random));
        passes.extend(Self::dod_5220_22_m().passes);
        Self {
            name: "dod-5220.22-m-ece".into(),
            passes,
        }
    }

    /// Gutmann: 4 random, 27 fixed patterns, 4 random; final pass verified
    pub fn gutmann() -> Self {
        let mut passes: Vec<PassSpec> = Vec::with_capacity(35);
        passes.extend((0..4).map(|_| PassSpec::unverified(PassPattern::Random)));
        passes.extend(
            GUTMANN_PATTERNS
                .iter()
                .map(|p| PassSpec::unverified(PassPattern::Fixed(p.to_vec()))),
        );
        passes.extend((0..4).map(|_| PassSpec::unverified(PassPattern::Random)));
        if let Some(last) = passes.last_mut() {
            last.verify = true;
        }
        Self {
            name: "gutmann".into(),
            passes,
        }
    }

    /// Random, ones, random; final pass verified
    pub fn rattlescan_legacy() -> Self {
        Self {
            name: "rattlescan-legacy".into(),
            passes: vec![
                PassSpec::unverified(PassPattern::Random),
                PassSpec::unverified(PassPattern::Ones),
                PassSpec::verified(PassPattern::Random),
            ],
        }
    }

    pub fn by_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "nist-800-88-clear" | "nist" | "clear" => Ok(Self::nist_800_88_clear()),
            "dod-5220.22-m" | "dod" => Ok(Self::dod_5220_22_m()),
            "dod-5220.22-m-ece" | "dod-ece" => Ok(Self::dod_5220_22_m_ece()),
            "gutmann" => Ok(Self::gutmann()),
            "rattlescan-legacy" | "legacy" => Ok(Self::rattlescan_legacy()),
            other => Err(Error::InvalidPlan(format!(
                "unknown plan '{}', expected one of: {}",
                other,
                PRESET_NAMES.join(", ")
            ))),
        }
    }
}

impl Default for WipePlan {
    fn default() -> Self {
        Self::dod_5220_22_m()
    }
}

impl FromStr for WipePlan {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::by_name(s)
    }
}
