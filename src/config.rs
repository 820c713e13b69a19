//! Rebuild entries as configured in the TOML file.

use std::path::Path;

use serde::Deserialize;

use crate::{
    core::{
        battery::BatterySeries,
        price::{PricePeriod, PriceRange, PriceRanges},
    },
    prelude::*,
    quantity::energy::KilowattHours,
    rebuild::{RebuildError, battery::BatteryRebuild, cost::CostRebuild},
    recorder::metadata::StatisticMetadata,
};

#[must_use]
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub battery: Vec<BatteryEntry>,

    #[serde(default)]
    pub cost: Vec<CostEntry>,
}

impl Config {
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read `{}`", path.display()))?;
        let this: Self =
            toml::from_str(&text).with_context(|| format!("failed to parse `{}`", path.display()))?;
        info!(n_battery = this.battery.len(), n_cost = this.cost.len(), "loaded the configuration");
        Ok(this)
    }
}

const fn default_rebuild() -> bool {
    true
}

fn default_currency() -> String {
    "EUR".to_owned()
}

/// Source statistic identifiers are required, and an empty one is as good as missing.
fn required(entry_id: &str, field: &str, value: Option<&str>) -> Result<String, RebuildError> {
    value.filter(|value| !value.trim().is_empty()).map(str::to_owned).ok_or_else(|| {
        RebuildError::Configuration(format!("entry `{entry_id}` is missing `{field}`"))
    })
}

#[must_use]
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatteryEntry {
    pub entry_id: String,

    #[serde(default = "default_rebuild")]
    pub rebuild: bool,

    /// Base consumption meter.
    pub base: Option<String>,

    /// Grid injection meter.
    pub injection: Option<String>,

    #[serde(default)]
    pub starting_capacity: KilowattHours,

    #[serde(default)]
    pub derived: DerivedBatteryIds,
}

/// Overrides of the derived statistic identifiers.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DerivedBatteryIds {
    pub battery_in: Option<String>,
    pub battery_out: Option<String>,
    pub capacity: Option<String>,
    pub base_emulated: Option<String>,
    pub injection_emulated: Option<String>,
}

impl BatteryEntry {
    pub fn to_job(&self) -> Result<BatteryRebuild, RebuildError> {
        let statistic_id = |configured: Option<&str>, suffix: &str| {
            configured.map_or_else(|| format!("sensor.{}_{suffix}", self.entry_id), str::to_owned)
        };
        let energy = |configured: Option<&str>, suffix: &str| {
            StatisticMetadata::builder().statistic_id(statistic_id(configured, suffix)).build()
        };
        Ok(BatteryRebuild {
            entry_id: self.entry_id.clone(),
            base: required(&self.entry_id, "base", self.base.as_deref())?,
            injection: required(&self.entry_id, "injection", self.injection.as_deref())?,
            starting_capacity: self.starting_capacity.non_negative(),
            derived: BatterySeries {
                battery_in: energy(self.derived.battery_in.as_deref(), "battery_in"),
                battery_out: energy(self.derived.battery_out.as_deref(), "battery_out"),
                capacity: StatisticMetadata::builder()
                    .statistic_id(statistic_id(self.derived.capacity.as_deref(), "battery_capacity"))
                    .unit("kW")
                    .unit_class("power")
                    .build(),
                base_emulated: energy(self.derived.base_emulated.as_deref(), "base_emulated"),
                injection_emulated: energy(self.derived.injection_emulated.as_deref(), "injection_emulated"),
            },
        })
    }
}

#[must_use]
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CostEntry {
    pub entry_id: String,

    #[serde(default = "default_rebuild")]
    pub rebuild: bool,

    /// Energy meter the cost is derived from.
    pub energy: Option<String>,

    /// Derived cost statistic.
    pub cost: Option<String>,

    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default)]
    pub prices: Vec<PricePeriod>,
}

impl CostEntry {
    pub fn to_job(&self) -> Result<CostRebuild, RebuildError> {
        let prices: PriceRanges = self
            .prices
            .iter()
            .map(|period| {
                let range = PriceRange::from(*period);
                if range.is_empty() {
                    warn!(
                        entry_id = %self.entry_id,
                        from = %period.from,
                        to = %period.to,
                        "the price period is empty and will never match",
                    );
                }
                range
            })
            .collect();
        Ok(CostRebuild {
            entry_id: self.entry_id.clone(),
            energy: required(&self.entry_id, "energy", self.energy.as_deref())?,
            cost: StatisticMetadata::builder()
                .statistic_id(
                    self.cost.clone().unwrap_or_else(|| format!("sensor.{}_cost", self.entry_id)),
                )
                .unit(self.currency.as_str())
                .unit_class("monetary")
                .build(),
            prices,
        })
    }
}
