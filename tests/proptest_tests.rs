//! Property-based tests for the IGV arithmetic and document rendering.

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sunat_cpe::core::*;
use sunat_cpe::ubl;

/// Amounts in cents, 0.00 .. 99_999.99.
fn amount() -> impl Strategy<Value = Decimal> {
    (0i64..10_000_000).prop_map(|c| Decimal::new(c, 2))
}

/// Unit prices with up to 4 decimals, 0.0001 .. 9_999.9999.
fn unit_price() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000).prop_map(|p| Decimal::new(p, 4))
}

fn quantity() -> impl Strategy<Value = Decimal> {
    (1i64..100_000).prop_map(|q| Decimal::new(q, 3))
}

/// Any non-negative decimal: all 96 mantissa bits, every scale 0..=28.
fn any_decimal() -> impl Strategy<Value = Decimal> {
    prop_oneof![
        (any::<u32>(), any::<u32>(), any::<u32>(), 0u32..=28)
            .prop_map(|(lo, mid, hi, scale)| Decimal::from_parts(lo, mid, hi, false, scale)),
        Just(Decimal::MAX),
        Just(MAX_QUANTITY),
        Just(Decimal::from_parts(1, 0, 0, false, 28)),
    ]
}

fn affectation() -> impl Strategy<Value = TaxAffectation> {
    prop_oneof![
        4 => Just(TaxAffectation::Taxed),
        1 => Just(TaxAffectation::Exonerated),
        1 => Just(TaxAffectation::Unaffected),
        1 => Just(TaxAffectation::Export),
    ]
}

fn line() -> impl Strategy<Value = InvoiceLine> {
    (quantity(), unit_price(), affectation(), any::<bool>()).prop_map(|(q, p, a, inclusive)| {
        let builder = LineBuilder::new("Articulo", q, p).affectation(a);
        if inclusive {
            builder.build()
        } else {
            builder.net_price().build()
        }
    })
}

fn header(number: u32) -> DocumentHeader {
    DocumentHeader {
        document_type: DocumentType::Invoice,
        series: "F001".into(),
        number,
        issue_date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
        currency: "PEN".into(),
        operation_type: "0101".into(),
        environment: SunatEnvironment::Beta,
        reference: None,
    }
}

fn issuer() -> Issuer {
    IssuerBuilder::new("20123456789", "LAPIZ Y PAPEL S.A.C.")
        .address(AddressBuilder::new("150101", "AV. ABANCAY 123").build())
        .build()
}

proptest! {
    #[test]
    fn inclusive_split_reconciles_to_the_tendered_amount(total in amount()) {
        let s = split_amount(total, true, DEFAULT_IGV_RATE).unwrap();
        prop_assert_eq!(s.subtotal + s.tax, s.total);
        prop_assert_eq!(s.total, total);
        prop_assert!(s.tax >= Decimal::ZERO);
    }

    #[test]
    fn exclusive_split_adds_rounded_tax(subtotal in amount()) {
        let s = split_amount(subtotal, false, DEFAULT_IGV_RATE).unwrap();
        prop_assert_eq!(s.subtotal, subtotal);
        prop_assert_eq!(s.tax, round_half_up(subtotal * dec!(0.18), 2));
        prop_assert_eq!(s.total, s.subtotal + s.tax);
    }

    #[test]
    fn every_line_and_the_document_reconcile(lines in prop::collection::vec(line(), 1..20)) {
        let b = compute_breakdown(&lines, DEFAULT_IGV_RATE).unwrap();

        for lb in &b.lines {
            prop_assert_eq!(lb.subtotal + lb.tax, lb.total);
            prop_assert_eq!(round_half_up(lb.subtotal, 2), lb.subtotal);
            prop_assert_eq!(round_half_up(lb.tax, 2), lb.tax);
        }
        let subtotal: Decimal = b.lines.iter().map(|l| l.subtotal).sum();
        let tax: Decimal = b.lines.iter().map(|l| l.tax).sum();
        prop_assert_eq!(b.subtotal, subtotal);
        prop_assert_eq!(b.tax_amount, tax);
        prop_assert_eq!(b.total, b.subtotal + b.tax_amount);
        prop_assert_eq!(
            b.taxed_base + b.exonerated_base + b.unaffected_base + b.export_base,
            b.subtotal
        );
        prop_assert!(validate_breakdown(&b).is_empty());
    }

    #[test]
    fn breakdown_never_panics_across_the_decimal_range(
        q in any_decimal(),
        p in any_decimal(),
        a in affectation(),
        inclusive in any::<bool>(),
    ) {
        let mut line = LineBuilder::new("Articulo", q, p).affectation(a).build();
        line.price_includes_tax = inclusive;
        let in_range = q <= MAX_QUANTITY && p <= MAX_UNIT_PRICE;

        let result = compute_breakdown(std::slice::from_ref(&line), DEFAULT_IGV_RATE);
        prop_assert_eq!(result.is_ok(), in_range);
        prop_assert_eq!(validate_lines(&[line]).is_empty(), in_range);
        if let Ok(b) = result {
            prop_assert!(validate_breakdown(&b).is_empty());
        }
    }

    #[test]
    fn untaxed_lines_carry_no_tax(q in quantity(), p in unit_price()) {
        let line = LineBuilder::new("Libro", q, p)
            .affectation(TaxAffectation::Exonerated)
            .build();
        let b = compute_breakdown(&[line], DEFAULT_IGV_RATE).unwrap();
        prop_assert_eq!(b.tax_amount, Decimal::ZERO);
        prop_assert_eq!(b.exonerated_base, b.subtotal);
    }

    #[test]
    fn rendering_is_deterministic(
        lines in prop::collection::vec(line(), 1..6),
        number in 1u32..=MAX_CORRELATIVE,
    ) {
        let b = compute_breakdown(&lines, DEFAULT_IGV_RATE).unwrap();
        let customer = Customer::with_ruc("20987654321", "CLIENTE SAC");
        let first = ubl::build(&header(number), &issuer(), &customer, &lines, &b).unwrap();
        let second = ubl::build(&header(number), &issuer(), &customer, &lines, &b).unwrap();
        prop_assert_eq!(&first, &second);

        let expected_id = format!("F001-{number:08}");
        let id = ubl::first_element_text(&first, "ID").unwrap();
        prop_assert_eq!(id.as_deref(), Some(expected_id.as_str()));
    }

    #[test]
    fn document_id_round_trips(number in 1u32..=MAX_CORRELATIVE) {
        let n = DocumentNumber::new("B001", number);
        prop_assert_eq!(DocumentNumber::parse(&n.document_id()).unwrap(), n);
    }
}

#[test]
fn reference_values() {
    let inclusive = split_amount(dec!(118.00), true, dec!(0.18)).unwrap();
    assert_eq!(inclusive.subtotal, dec!(100.00));
    assert_eq!(inclusive.tax, dec!(18.00));

    let exclusive = split_amount(dec!(100.00), false, dec!(0.18)).unwrap();
    assert_eq!(exclusive.tax, dec!(18.00));
    assert_eq!(exclusive.total, dec!(118.00));
}
