use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};

use crate::{
    quantity::energy::KilowattHours,
    rebuild::{battery::BatteryOutcome, cost::CostOutcome},
};

fn new_table(entry_id: &str, kind: &str) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .enforce_styling();
    table.set_header(vec![
        Cell::new(entry_id).add_attribute(Attribute::Bold),
        Cell::new(kind).add_attribute(Attribute::Dim),
    ]);
    table
}

fn state_cell(state: Option<KilowattHours>) -> Cell {
    state.map_or_else(
        || Cell::new("unknown").add_attribute(Attribute::Dim),
        |state| Cell::new(state).set_alignment(CellAlignment::Right),
    )
}

pub fn build_battery_table(entry_id: &str, outcome: &BatteryOutcome) -> Table {
    let totals = &outcome.totals;
    let mut table = new_table(entry_id, "battery");
    table.add_row(vec![
        Cell::new("Battery in"),
        Cell::new(totals.battery_in).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Battery out"),
        Cell::new(totals.battery_out).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Capacity"),
        Cell::new(totals.capacity).set_alignment(CellAlignment::Right).fg(
            if totals.capacity > KilowattHours::ZERO { Color::Green } else { Color::DarkYellow },
        ),
    ]);
    table.add_row(vec![
        Cell::new("Base emulated"),
        Cell::new(totals.base_emulated).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Last base state").add_attribute(Attribute::Dim),
        state_cell(totals.last_base_state),
    ]);
    table.add_row(vec![
        Cell::new("Last injection state").add_attribute(Attribute::Dim),
        state_cell(totals.last_injection_state),
    ]);
    table.add_row(vec![
        Cell::new("Rows written"),
        Cell::new(outcome.n_rows).set_alignment(CellAlignment::Right),
    ]);
    table
}

pub fn build_cost_table(entry_id: &str, outcome: &CostOutcome) -> Table {
    let mut table = new_table(entry_id, "cost");
    table.add_row(vec![
        Cell::new("Cost"),
        Cell::new(format!("{:.2}", outcome.totals.cost.0)).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Last energy state").add_attribute(Attribute::Dim),
        state_cell(outcome.totals.last_energy_state),
    ]);
    table.add_row(vec![
        Cell::new("Rows written"),
        Cell::new(outcome.n_rows).set_alignment(CellAlignment::Right),
    ]);
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{battery::BatteryTotals, cost::CostTotals},
        quantity::cost::Cost,
    };

    #[test]
    fn battery_table_ok() {
        let outcome = BatteryOutcome {
            totals: BatteryTotals {
                battery_in: KilowattHours(5.0),
                battery_out: KilowattHours(5.0),
                capacity: KilowattHours::ZERO,
                base_emulated: KilowattHours(1.0),
                last_base_state: Some(KilowattHours(106.0)),
                last_injection_state: None,
            },
            n_rows: 15,
        };
        let table = build_battery_table("home", &outcome);
        assert_eq!(table.row_count(), 7);
        let rendered = table.to_string();
        assert!(rendered.contains("106 kWh"));
        assert!(rendered.contains("unknown"));
    }

    #[test]
    fn cost_table_ok() {
        let outcome = CostOutcome {
            totals: CostTotals { cost: Cost(5.0), last_energy_state: None },
            n_rows: 3,
        };
        let table = build_cost_table("home", &outcome);
        assert!(table.to_string().contains("5.00"));
    }
}
