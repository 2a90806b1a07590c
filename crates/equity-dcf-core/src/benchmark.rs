//! Static industry benchmark table: median operating margin and median
//! after-tax ROIC per industry, with sector defaults and a market-aggregate
//! ultimate fallback. Figures are unlevered medians in the Damodaran style,
//! good enough for plausibility thresholds rather than valuation inputs.

use serde::{Deserialize, Serialize};

/// Median profile for an industry peer group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IndustryBenchmark {
    pub operating_margin: f64,
    pub after_tax_roic: f64,
    pub number_of_firms: u32,
}

/// Warning and error bounds derived from the medians.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IndustryThresholds {
    pub margin_warning: f64,
    pub margin_error: f64,
    pub roic_warning: f64,
    pub roic_error: f64,
}

/// (industry, operating margin, after-tax ROIC, firm count)
const INDUSTRY_TABLE: &[(&str, f64, f64, u32)] = &[
    ("Software—Application", 0.24, 0.22, 174),
    ("Software—Infrastructure", 0.27, 0.20, 82),
    ("Semiconductors", 0.23, 0.18, 72),
    ("Semiconductor Equipment & Materials", 0.22, 0.17, 34),
    ("Information Technology Services", 0.12, 0.15, 64),
    ("Consumer Electronics", 0.14, 0.16, 22),
    ("Internet Content & Information", 0.21, 0.17, 58),
    ("Internet Retail", 0.06, 0.11, 36),
    ("Drug Manufacturers—General", 0.25, 0.16, 28),
    ("Biotechnology", 0.10, 0.08, 260),
    ("Medical Devices", 0.18, 0.13, 96),
    ("Banks—Diversified", 0.30, 0.09, 42),
    ("Insurance—Diversified", 0.12, 0.08, 30),
    ("Asset Management", 0.28, 0.11, 74),
    ("Aerospace & Defense", 0.11, 0.12, 48),
    ("Auto Manufacturers", 0.07, 0.08, 20),
    ("Specialty Retail", 0.07, 0.13, 54),
    ("Restaurants", 0.13, 0.12, 38),
    ("Beverages—Non-Alcoholic", 0.19, 0.14, 16),
    ("Household & Personal Products", 0.17, 0.14, 24),
    ("Oil & Gas Integrated", 0.12, 0.09, 14),
    ("Oil & Gas E&P", 0.22, 0.08, 60),
    ("Utilities—Regulated Electric", 0.21, 0.05, 34),
    ("Telecom Services", 0.16, 0.06, 40),
    ("REIT—Diversified", 0.30, 0.05, 28),
];

/// (sector, operating margin, after-tax ROIC, firm count)
const SECTOR_TABLE: &[(&str, f64, f64, u32)] = &[
    ("Technology", 0.20, 0.17, 520),
    ("Healthcare", 0.15, 0.11, 480),
    ("Financial Services", 0.22, 0.09, 350),
    ("Consumer Cyclical", 0.09, 0.11, 420),
    ("Consumer Defensive", 0.12, 0.12, 210),
    ("Energy", 0.15, 0.08, 180),
    ("Industrials", 0.11, 0.11, 440),
    ("Basic Materials", 0.13, 0.09, 200),
    ("Utilities", 0.20, 0.05, 90),
    ("Real Estate", 0.26, 0.05, 180),
    ("Communication Services", 0.17, 0.10, 140),
];

/// All-market aggregate, the fallback of last resort.
const MARKET_AGGREGATE: IndustryBenchmark = IndustryBenchmark {
    operating_margin: 0.13,
    after_tax_roic: 0.10,
    number_of_firms: 5800,
};

/// Look up the benchmark for `(industry, sector)`: exact industry match
/// first, then the sector default, then the market aggregate.
pub fn get_industry_benchmark(industry: &str, sector: &str) -> IndustryBenchmark {
    let industry = industry.trim();
    if let Some(&(_, margin, roic, firms)) = INDUSTRY_TABLE.iter().find(|(name, ..)| *name == industry)
    {
        return IndustryBenchmark {
            operating_margin: margin,
            after_tax_roic: roic,
            number_of_firms: firms,
        };
    }

    let sector = sector.trim();
    if let Some(&(_, margin, roic, firms)) = SECTOR_TABLE.iter().find(|(name, ..)| *name == sector) {
        return IndustryBenchmark {
            operating_margin: margin,
            after_tax_roic: roic,
            number_of_firms: firms,
        };
    }

    MARKET_AGGREGATE
}

/// Derive warning/error bounds as bounded multiples of the medians. The 0.05
/// floor keeps thin-margin industries from producing thresholds a healthy
/// company would trip on noise.
pub fn get_industry_thresholds(benchmark: &IndustryBenchmark) -> IndustryThresholds {
    let margin_base = benchmark.operating_margin.max(0.05);
    let roic_base = benchmark.after_tax_roic.max(0.05);

    IndustryThresholds {
        margin_warning: (margin_base * 1.5).min(0.50),
        margin_error: (margin_base * 2.0).min(0.60),
        roic_warning: (roic_base * 1.3).min(0.60),
        roic_error: (roic_base * 1.6).min(0.80),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_industry_match() {
        let b = get_industry_benchmark("Software—Application", "Technology");
        assert_eq!(b.number_of_firms, 174);
        assert!((b.operating_margin - 0.24).abs() < 1e-12);
    }

    #[test]
    fn test_industry_lookup_trims_whitespace() {
        let b = get_industry_benchmark("  Software—Application ", "Technology");
        assert_eq!(b.number_of_firms, 174);
    }

    #[test]
    fn test_sector_fallback() {
        let b = get_industry_benchmark("Quantum Abacus Manufacturing", "Technology");
        assert!((b.operating_margin - 0.20).abs() < 1e-12);
        assert!((b.after_tax_roic - 0.17).abs() < 1e-12);
    }

    #[test]
    fn test_market_aggregate_fallback() {
        let b = get_industry_benchmark("Unknown", "Unknown");
        assert_eq!(b.number_of_firms, MARKET_AGGREGATE.number_of_firms);
    }

    #[test]
    fn test_threshold_derivation() {
        let b = IndustryBenchmark {
            operating_margin: 0.20,
            after_tax_roic: 0.15,
            number_of_firms: 1,
        };
        let t = get_industry_thresholds(&b);
        assert!((t.margin_warning - 0.30).abs() < 1e-12);
        assert!((t.margin_error - 0.40).abs() < 1e-12);
        assert!((t.roic_warning - 0.195).abs() < 1e-12);
        assert!((t.roic_error - 0.24).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_floor_and_caps() {
        // A 2% margin industry still uses the 5% base.
        let thin = IndustryBenchmark {
            operating_margin: 0.02,
            after_tax_roic: 0.02,
            number_of_firms: 1,
        };
        let t = get_industry_thresholds(&thin);
        assert!((t.margin_warning - 0.075).abs() < 1e-12);
        // A 45% margin industry hits the absolute caps.
        let fat = IndustryBenchmark {
            operating_margin: 0.45,
            after_tax_roic: 0.70,
            number_of_firms: 1,
        };
        let t = get_industry_thresholds(&fat);
        assert!((t.margin_warning - 0.50).abs() < 1e-12);
        assert!((t.margin_error - 0.60).abs() < 1e-12);
        assert!((t.roic_warning - 0.60).abs() < 1e-12);
        assert!((t.roic_error - 0.80).abs() < 1e-12);
    }
}
