use gridcalc_workbook::scanner::extract_references;
use gridcalc_workbook::{
    AffectedCell, CellSet, CellUpdate, FormulaUpdate, RecalcPolicy, Workbook, WorkbookConfig,
};

fn values(cells: &[AffectedCell]) -> Vec<(String, String)> {
    cells
        .iter()
        .map(|c| (c.cell.to_string(), c.cached_value.clone()))
        .collect()
}

fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
    expected
        .iter()
        .map(|(c, v)| (c.to_string(), v.to_string()))
        .collect()
}

#[test]
fn chained_dependencies_propagate() {
    let mut wb = Workbook::new();
    wb.set_cell_value("Sheet1", "A1", 10).unwrap();
    wb.set_cell_formula("Sheet1", "B1", "A1*2").unwrap();
    wb.set_cell_formula("Sheet1", "C1", "B1+10").unwrap();
    wb.set_cell_formula("Sheet1", "D1", "C1*2").unwrap();
    assert_eq!(
        values(&wb.recalculate_all()),
        pairs(&[("B1", "20"), ("C1", "30"), ("D1", "60")])
    );

    let update = [CellUpdate::new("Sheet1", "A1", 100)];
    let first = wb.batch_update_and_recalculate(&update).unwrap();
    let second = wb.batch_update_and_recalculate(&update).unwrap();
    assert_eq!(first, second);
    assert_eq!(values(&second), pairs(&[("B1", "200"), ("C1", "210"), ("D1", "420")]));
    assert_eq!(wb.get_cell_value("Sheet1", "D1").unwrap(), "420");
}

#[test]
fn batch_update_only_touches_dependents() {
    let mut wb = Workbook::new();
    wb.new_sheet("Data").unwrap();
    wb.set_cell_value("Data", "A1", 1).unwrap();
    wb.set_cell_value("Data", "B1", 2).unwrap();
    wb.set_cell_formula("Sheet1", "A1", "Data!A1+1").unwrap();
    wb.set_cell_formula("Sheet1", "A2", "Data!B1+1").unwrap();
    wb.set_cell_formula("Sheet1", "A3", "SUM(Data!A:A)").unwrap();
    wb.set_cell_formula("Sheet1", "A4", "SUM(Data!A1:A10)").unwrap();
    wb.set_cell_formula("Sheet1", "A5", "\"Data!A1\"").unwrap();
    wb.recalculate_all();

    let out = wb
        .batch_update_and_recalculate(&[CellUpdate::new("Data", "A1", 5)])
        .unwrap();
    assert_eq!(values(&out), pairs(&[("A1", "6"), ("A3", "5"), ("A4", "5")]));
    assert!(out.iter().all(|c| c.sheet == "Sheet1"));
    assert_eq!(wb.get_cell_value("Sheet1", "A2").unwrap(), "3");
}

#[test]
fn batch_update_writes_are_validated_first() {
    let mut wb = Workbook::new();
    let err = wb
        .batch_update_and_recalculate(&[
            CellUpdate::new("Sheet1", "A1", 1),
            CellUpdate::new("Sheet1", "not a cell", 2),
        ])
        .unwrap_err();
    assert_eq!(
        err,
        gridcalc_workbook::WorkbookError::InvalidCellReference("not a cell".into())
    );
    assert_eq!(wb.get_cell_value("Sheet1", "A1").unwrap(), "");
}

#[test]
fn affected_cells_reference_the_changed_set() {
    let mut wb = Workbook::new();
    wb.new_sheet("Other").unwrap();
    let formulas = [
        ("Sheet1", "B1", "A1*2"),
        ("Sheet1", "B2", "B1+A2"),
        ("Sheet1", "B3", "B2+Other!C3"),
        ("Other", "C3", "Sheet1!A9"),
        ("Other", "D4", "Sheet1!B3*2"),
        ("Other", "E5", "C9"),
        ("Sheet1", "B4", "SUM(A5:A6)"),
    ];
    for (sheet, cell, f) in formulas {
        wb.set_cell_formula(sheet, cell, f).unwrap();
    }
    wb.recalculate_all();

    let updates = [
        CellUpdate::new("Sheet1", "A1", 3),
        CellUpdate::new("Sheet1", "A9", 4),
    ];
    let out = wb.batch_update_and_recalculate(&updates).unwrap();

    let mut changed = CellSet::new();
    for u in &updates {
        changed.insert(&u.sheet, u.cell.parse().unwrap());
    }
    for c in &out {
        changed.insert(&c.sheet, c.cell);
    }
    for c in &out {
        let f = wb.get_cell_formula(&c.sheet, &c.cell.to_string()).unwrap();
        let refs = extract_references(&f, &c.sheet);
        assert!(refs.iter().any(|r| r.hits(&changed)), "{}!{} = {f}", c.sheet, c.cell);
    }
    let touched: Vec<String> = out.iter().map(|c| format!("{}!{}", c.sheet, c.cell)).collect();
    assert_eq!(
        touched,
        ["Sheet1!B1", "Sheet1!B2", "Sheet1!B3", "Other!C3", "Other!D4"]
    );
}

#[test]
fn every_formula_stays_in_the_chain() {
    let mut wb = Workbook::new();
    wb.new_sheet("Data").unwrap();
    wb.set_cell_formula("Sheet1", "A1", "1").unwrap();
    wb.set_cell_formula("Data", "C3", "Sheet1!A1").unwrap();
    wb.set_shared_formula("Data", "D1:D4", "C1+1").unwrap();
    wb.set_cell_formula("Sheet1", "A1", "").unwrap();
    wb.set_cell_value("Data", "D2", 7).unwrap();
    wb.load_calc_chain(&[]);
    wb.rebuild_calc_chain();
    wb.set_cell_formula("Sheet1", "Z9", "=Data!D4").unwrap();

    let mut formulas = 0;
    for name in wb.sheet_names() {
        for (cell, _) in wb.sheet(&name).unwrap().formula_cells() {
            formulas += 1;
            assert!(wb.calc_chain_contains(&name, &cell.to_string()), "{name}!{cell}");
        }
    }
    assert_eq!(formulas, 5);
    assert_eq!(wb.calc_chain().len(), 5);
    assert!(!wb.calc_chain_contains("Sheet1", "A1"));
}

#[test]
fn rebuilt_chain_is_sheet_then_row_ordered() {
    let mut wb = Workbook::new();
    wb.new_sheet("Data").unwrap();
    wb.set_cell_formula("Data", "A1", "1").unwrap();
    wb.set_cell_formula("Sheet1", "B2", "1").unwrap();
    wb.set_cell_formula("Sheet1", "A2", "1").unwrap();
    wb.set_cell_formula("Sheet1", "C1", "1").unwrap();
    wb.rebuild_calc_chain();

    let chain: Vec<(u32, String)> = wb
        .calc_chain()
        .iter()
        .map(|e| (e.sheet_id, e.cell.to_string()))
        .collect();
    assert_eq!(
        chain,
        [
            (1, "C1".to_string()),
            (0, "A2".to_string()),
            (0, "B2".to_string()),
            (2, "A1".to_string()),
        ]
    );
}

#[test]
fn batch_formulas_recalculate_new_cells_and_dependents() {
    let config = WorkbookConfig::default().with_recalc_policy(RecalcPolicy::UntilStable { max_passes: 5 });
    let mut wb = Workbook::with_config(config);
    wb.set_cell_value("Sheet1", "A1", 1).unwrap();
    wb.set_cell_formula("Sheet1", "C1", "B1+1").unwrap();
    wb.set_cell_formula("Sheet1", "E1", "A1").unwrap();
    wb.recalculate_all();

    let out = wb
        .batch_set_formulas_and_recalculate(&[
            FormulaUpdate::new("Sheet1", "B1", "=A1*10"),
            FormulaUpdate::new("Sheet1", "D1", "B1+C1"),
        ])
        .unwrap();
    assert_eq!(
        values(&out),
        pairs(&[("C1", "11"), ("B1", "10"), ("D1", "21")])
    );

    let out = wb
        .batch_set_formulas_and_recalculate(&[FormulaUpdate::new("Sheet1", "B1", "")])
        .unwrap();
    let cells: Vec<String> = out.iter().map(|c| c.cell.to_string()).collect();
    assert_eq!(cells, ["C1", "D1"]);
    assert!(!wb.calc_chain_contains("Sheet1", "B1"));
}

#[test]
fn shared_formulas_evaluate_per_cell() {
    let mut wb = Workbook::new();
    for (i, v) in [3, 4, 5].iter().enumerate() {
        wb.set_cell_value("Sheet1", &format!("A{}", i + 1), *v).unwrap();
    }
    wb.set_cell_value("Sheet1", "C1", 10).unwrap();
    wb.set_shared_formula("Sheet1", "B1:B3", "A1*$C$1").unwrap();

    assert_eq!(
        values(&wb.recalculate_all()),
        pairs(&[("B1", "30"), ("B2", "40"), ("B3", "50")])
    );
    assert_eq!(wb.get_cell_formula("Sheet1", "B2").unwrap(), "A2*$C$1");
    assert_eq!(
        wb.get_formulas("Sheet1").unwrap()[2],
        vec![String::new(), "A3*$C$1".to_string()]
    );

    let out = wb
        .batch_update_and_recalculate(&[CellUpdate::new("Sheet1", "C1", 2)])
        .unwrap();
    assert_eq!(values(&out), pairs(&[("B1", "6"), ("B2", "8"), ("B3", "10")]));
}

#[test]
fn ad_hoc_evaluation_persists_nothing() {
    let mut wb = Workbook::new();
    for (i, v) in [1, 2, 3].iter().enumerate() {
        wb.set_cell_value("Sheet1", &format!("A{}", i + 1), *v).unwrap();
    }
    wb.set_cell_formula("Sheet1", "B1", "SUM(A1:A3)").unwrap();
    let chain = wb.calc_chain();

    assert_eq!(wb.calc_formula_value("Sheet1", "C1", "=SUM(A1:A3)*2").unwrap(), "12");
    assert_eq!(wb.calc_formula_value("Sheet1", "C1", "A1&\"x\"").unwrap(), "1x");
    assert_eq!(wb.get_cell_formula("Sheet1", "C1").unwrap(), "");
    assert_eq!(wb.get_cell_value("Sheet1", "C1").unwrap(), "");
    assert_eq!(wb.calc_chain(), chain);

    // Computed through the cache but not written into the cell.
    assert_eq!(wb.calc_cell_value("Sheet1", "B1", true).unwrap(), "6");
    assert_eq!(wb.get_cell_value("Sheet1", "B1").unwrap(), "");
    assert_eq!(wb.calc_cell_value("Sheet1", "A2", true).unwrap(), "2");
    assert!(wb.calc_formula_value("Sheet1", "C1", "").is_err());
    assert!(wb.calc_formula_value("Nope", "C1", "1").is_err());
}

#[test]
fn result_types_follow_the_value() {
    let mut wb = Workbook::new();
    wb.set_cell_formula("Sheet1", "A1", "1/4").unwrap();
    wb.set_cell_formula("Sheet1", "A2", "1>0").unwrap();
    wb.set_cell_formula("Sheet1", "A3", "\"x\"&\"y\"").unwrap();
    wb.set_cell_formula("Sheet1", "A4", "1/0").unwrap();
    wb.set_cell_formula("Sheet1", "A5", "Z99").unwrap();
    wb.recalculate_all();

    let ws = wb.sheet("Sheet1").unwrap();
    let types: Vec<&str> = (1..=5)
        .map(|r| {
            ws.cell(gridcalc_workbook::CellAddress::new(1, r))
                .unwrap()
                .cell_type
                .tag()
        })
        .collect();
    assert_eq!(types, ["n", "b", "str", "e", ""]);
    assert_eq!(wb.get_cell_value("Sheet1", "A1").unwrap(), "0.25");
    assert_eq!(wb.get_cell_value("Sheet1", "A4").unwrap(), "#DIV/0!");
}

#[test]
fn config_round_trips_through_json() {
    let config = WorkbookConfig::debug()
        .with_recalc_policy(RecalcPolicy::UntilStable { max_passes: 3 })
        .with_batch_threshold(25);
    let json = serde_json::to_string(&config).unwrap();
    assert!(json.contains("\"mode\":\"until_stable\""));
    let back: WorkbookConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);

    let partial: WorkbookConfig = serde_json::from_str(r#"{"debug":true}"#).unwrap();
    assert!(partial.debug);
    assert_eq!(partial.batch_threshold, 10);
    assert_eq!(partial.recalc_policy, RecalcPolicy::SinglePass);

    let wb = Workbook::with_config(WorkbookConfig {
        default_sheet: "Main".into(),
        ..WorkbookConfig::default()
    });
    assert_eq!(wb.sheet_names(), ["Main"]);
}
