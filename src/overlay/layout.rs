use crate::prefs::ColumnPreference;

pub const MIN_COLUMNS: u8 = 2;
pub const MAX_COLUMNS: u8 = 4;

/// Columns to render: explicit choices apply as-is, `auto` fits as many
/// `column_width`-wide columns as the viewport allows, within [2, 4].
pub fn column_count(pref: ColumnPreference, viewport_width: u32, column_width: u32) -> u8 {
    if let Some(n) = pref.fixed() {
        return n;
    }
    let fit = viewport_width / column_width.max(1);
    fit.clamp(u32::from(MIN_COLUMNS), u32::from(MAX_COLUMNS)) as u8
}
