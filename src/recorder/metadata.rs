use bon::Builder;

/// Attributes of a `statistics_meta` row.
///
/// They are only used when the row gets created, and never updated afterwards.
#[must_use]
#[derive(Clone, Debug, Builder)]
pub struct StatisticMetadata {
    #[builder(into)]
    pub statistic_id: String,

    #[builder(into, default = "kWh".to_owned())]
    pub unit: String,

    #[builder(into, default = "energy".to_owned())]
    pub unit_class: String,

    pub has_mean: Option<bool>,

    #[builder(default = true)]
    pub has_sum: bool,

    #[builder(default = 0)]
    pub mean_type: i32,
}

impl StatisticMetadata {
    /// Source meter: only its identifier matters because it is never created.
    pub fn source(statistic_id: impl Into<String>) -> Self {
        Self::builder().statistic_id(statistic_id).build()
    }
}
