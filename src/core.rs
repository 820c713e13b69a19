//! Pure computation: nothing in here touches the database.

pub mod battery;
pub mod cost;
pub mod price;
pub mod reconciler;
pub mod row;
pub mod sample;
