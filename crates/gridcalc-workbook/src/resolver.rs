use gridcalc_common::{CellAddress, CellType, ExcelError, ExcelErrorKind, LiteralValue};
use gridcalc_eval::Resolver;

use crate::cache::ResultCache;
use crate::worksheet::Worksheet;

/// Evaluation-time view of the workbook. Formula cells are read through
/// their stored (last calculated) value.
pub(crate) struct WorkbookResolver<'a> {
    sheets: &'a [Worksheet],
    cache: &'a ResultCache,
}

impl<'a> WorkbookResolver<'a> {
    pub(crate) fn new(sheets: &'a [Worksheet], cache: &'a ResultCache) -> Self {
        Self { sheets, cache }
    }

    fn sheet(&self, name: &str) -> Option<&'a Worksheet> {
        self.sheets.iter().find(|s| s.name() == name)
    }
}

impl Resolver for WorkbookResolver<'_> {
    fn resolve_cell(&self, sheet: &str, cell: CellAddress) -> Result<LiteralValue, ExcelError> {
        let ws = self.sheet(sheet).ok_or_else(|| {
            ExcelError::new(ExcelErrorKind::Ref).with_message(format!("no sheet named {sheet}"))
        })?;
        Ok(ws.value(cell))
    }

    fn used_extent(&self, sheet: &str) -> Option<CellAddress> {
        self.sheet(sheet)?.used_extent()
    }

    fn cached_call(&self, sheet: &str, cell: CellAddress, call: &str) -> Option<LiteralValue> {
        self.cache
            .get_call(sheet, cell, call)
            .map(|text| LiteralValue::from_stored(&text, CellType::Empty))
    }
}
