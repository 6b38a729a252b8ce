use crate::builtins;
use crate::test_workbook::TestWorkbook;

fn sales() -> TestWorkbook {
    // A: region, B: qty, C: amount
    let rows = [
        ("north", 1.0, 10.0),
        ("north", 2.0, 20.0),
        ("south", 3.0, 30.0),
        ("North", 4.0, 40.0),
    ];
    let mut wb = TestWorkbook::new().with_sheet("Data");
    for (i, (region, qty, amount)) in rows.iter().enumerate() {
        let r = i + 1;
        wb = wb
            .with_text("Data", &format!("A{r}"), region)
            .with_number("Data", &format!("B{r}"), *qty)
            .with_number("Data", &format!("C{r}"), *amount);
    }
    wb
}

#[test]
fn registry_lookup() {
    assert!(builtins::lookup("SUMIFS").is_some());
    assert!(builtins::lookup("sumifs").is_none());
    assert!(builtins::names().contains(&"AVERAGEIFS"));
}

#[test]
fn basic_aggregates() {
    let wb = TestWorkbook::new()
        .with_number("Sheet1", "A1", 1.0)
        .with_number("Sheet1", "A2", 2.0)
        .with_text("Sheet1", "A3", "x");
    assert_eq!(wb.eval("=SUM(A1:A3)"), "3");
    assert_eq!(wb.eval("=SUM(A1:A3,10)"), "13");
    assert_eq!(wb.eval("=AVERAGE(A1:A3)"), "1.5");
    assert_eq!(wb.eval("=MIN(A1:A3)"), "1");
    assert_eq!(wb.eval("=MAX(A1:A3)"), "2");
    assert_eq!(wb.eval("=COUNT(A1:A3)"), "2");
    assert_eq!(wb.eval("=COUNTA(A1:A4)"), "3");
    assert_eq!(wb.eval("=AVERAGE(B1:B3)"), "#DIV/0!");
}

#[test]
fn errors_in_ranges_propagate() {
    let wb = TestWorkbook::new()
        .with_number("Sheet1", "A1", 1.0)
        .with_cell(
            "Sheet1",
            "A2",
            gridcalc_common::LiteralValue::Error(gridcalc_common::ExcelError::new(
                gridcalc_common::ExcelErrorKind::Na,
            )),
        );
    assert_eq!(wb.eval("=SUM(A1:A2)"), "#N/A");
    assert_eq!(wb.eval("=IFERROR(SUM(A1:A2),0)"), "0");
}

#[test]
fn math_functions() {
    let wb = TestWorkbook::new();
    assert_eq!(wb.eval("=ABS(-3)"), "3");
    assert_eq!(wb.eval("=ROUND(2.5,0)"), "3");
    assert_eq!(wb.eval("=ROUND(-2.5)"), "-3");
    assert_eq!(wb.eval("=ROUND(1234.5678,2)"), "1234.57");
}

#[test]
fn logical_functions() {
    let wb = TestWorkbook::new().with_text("Sheet1", "A1", "x");
    assert_eq!(wb.eval("=IF(A1=\"x\",\"yes\",\"no\")"), "yes");
    assert_eq!(wb.eval("=IF(0,1)"), "FALSE");
    assert_eq!(wb.eval("=IF(TRUE,1,1/0)"), "1");
    assert_eq!(wb.eval("=IFERROR(1/0,\"z\")"), "z");
    assert_eq!(wb.eval("=AND(TRUE,1)"), "TRUE");
    assert_eq!(wb.eval("=OR(FALSE,0)"), "FALSE");
    assert_eq!(wb.eval("=NOT(FALSE)"), "TRUE");
}

#[test]
fn text_functions() {
    let wb = TestWorkbook::new().with_number("Sheet1", "A1", 1.5);
    assert_eq!(wb.eval("=CONCATENATE(\"a\",A1,TRUE)"), "a1.5TRUE");
    assert_eq!(wb.eval("=CONCAT(\"x\",\"y\")"), "xy");
}

#[test]
fn conditional_sums() {
    let wb = sales();
    assert_eq!(wb.eval("=SUMIFS(Data!C:C,Data!A:A,\"north\")"), "70");
    assert_eq!(
        wb.eval("=SUMIFS(Data!C:C,Data!A:A,\"north\",Data!B:B,\">1\")"),
        "60"
    );
    assert_eq!(wb.eval("=SUMIFS(Data!C:C,Data!A:A,\"s*\")"), "30");
    assert_eq!(wb.eval("=SUMIF(Data!B:B,\">2\")"), "7");
    assert_eq!(wb.eval("=SUMIF(Data!A:A,\"south\",Data!C:C)"), "30");
    assert_eq!(wb.eval("=COUNTIFS(Data!A:A,\"<>south\")"), "3");
}

#[test]
fn conditional_averages() {
    let wb = sales();
    assert_eq!(wb.eval("=AVERAGEIFS(Data!C:C,Data!A:A,\"north\")"), "23.3333333333333");
    assert_eq!(wb.eval("=AVERAGEIFS(Data!C:C,Data!A:A,\"east\")"), "#DIV/0!");
}

#[test]
fn criteria_from_cells() {
    let wb = sales().with_text("Sheet1", "A1", "south");
    assert_eq!(wb.eval("=SUMIFS(Data!C:C,Data!A:A,A1)"), "30");
    assert_eq!(wb.eval("=SUMIFS(Data!C:C,Data!A:A)"), "#VALUE!");
}
