//! IGV breakdown arithmetic.
//!
//! Every amount is rounded half-up to 2 decimals before it is used
//! anywhere else, and document totals are sums of the rounded per-line
//! values. Unit prices carry 5 decimals.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use super::error::{CpeError, ValidationError};
use super::types::{InvoiceLine, LineBreakdown, MonetaryBreakdown, TaxAffectation};

/// Standard IGV rate (18%).
pub const DEFAULT_IGV_RATE: Decimal = dec!(0.18);

/// Decimal places for monetary amounts.
pub const AMOUNT_DP: u32 = 2;
/// Decimal places for unit prices.
pub const UNIT_PRICE_DP: u32 = 5;

/// Largest accepted line quantity.
pub const MAX_QUANTITY: Decimal = dec!(1000000000000);
/// Largest accepted unit price. Together with [`MAX_QUANTITY`] this keeps
/// every line amount, and any realistic document sum, far inside the
/// `Decimal` range.
pub const MAX_UNIT_PRICE: Decimal = dec!(1000000000000);

/// Round a Decimal to `dp` decimal places using half-up (commercial rounding).
pub fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

fn overflow(what: &str) -> CpeError {
    CpeError::Arithmetic(format!("{what} is outside the decimal range"))
}

/// A rounded subtotal / tax / total triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxSplit {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Split an amount into base and tax.
///
/// When `includes_tax` is set, `amount` is the tax-inclusive total and the
/// base is `amount / (1 + rate)`; otherwise `amount` is the base and the tax
/// is `base * rate`. The returned total is always `subtotal + tax`.
///
/// ```
/// use sunat_cpe::core::split_amount;
/// use rust_decimal_macros::dec;
///
/// let s = split_amount(dec!(118.00), true, dec!(0.18)).unwrap();
/// assert_eq!((s.subtotal, s.tax, s.total), (dec!(100.00), dec!(18.00), dec!(118.00)));
/// ```
///
/// # Errors
///
/// `CpeError::Arithmetic` when an intermediate value overflows.
pub fn split_amount(amount: Decimal, includes_tax: bool, rate: Decimal) -> Result<TaxSplit, CpeError> {
    let (subtotal, tax) = if includes_tax {
        let gross = round_half_up(amount, AMOUNT_DP);
        let base = Decimal::ONE
            .checked_add(rate)
            .and_then(|divisor| amount.checked_div(divisor))
            .ok_or_else(|| overflow("taxable base"))?;
        let subtotal = round_half_up(base, AMOUNT_DP);
        let tax = gross
            .checked_sub(subtotal)
            .ok_or_else(|| overflow("tax"))?;
        (subtotal, round_half_up(tax, AMOUNT_DP))
    } else {
        let subtotal = round_half_up(amount, AMOUNT_DP);
        let tax = subtotal
            .checked_mul(rate)
            .ok_or_else(|| overflow("tax"))?;
        (subtotal, round_half_up(tax, AMOUNT_DP))
    };
    Ok(TaxSplit {
        subtotal,
        tax,
        total: subtotal.checked_add(tax).ok_or_else(|| overflow("total"))?,
    })
}

/// Breakdown of a single line at the given IGV rate.
///
/// Lines that are not taxed are computed at rate zero.
///
/// # Errors
///
/// `CpeError::Arithmetic` for a negative quantity or unit price, values
/// above [`MAX_QUANTITY`] / [`MAX_UNIT_PRICE`], or an overflow.
pub fn line_breakdown(line: &InvoiceLine, igv_rate: Decimal) -> Result<LineBreakdown, CpeError> {
    if line.quantity < Decimal::ZERO || line.unit_price < Decimal::ZERO {
        return Err(CpeError::Arithmetic(
            "quantity and unit price must be non-negative".into(),
        ));
    }
    if line.quantity > MAX_QUANTITY || line.unit_price > MAX_UNIT_PRICE {
        return Err(CpeError::Arithmetic(format!(
            "quantity must not exceed {MAX_QUANTITY} and unit price {MAX_UNIT_PRICE}"
        )));
    }

    let rate = if line.tax_affectation.is_taxed() {
        igv_rate
    } else {
        Decimal::ZERO
    };
    let amount = line
        .quantity
        .checked_mul(line.unit_price)
        .ok_or_else(|| overflow("line amount"))?;
    let split = split_amount(amount, line.price_includes_tax, rate)?;

    let per_unit = |value: Decimal, divisor: Decimal| {
        value
            .checked_div(divisor)
            .map(|v| round_half_up(v, UNIT_PRICE_DP))
            .ok_or_else(|| overflow("unit value"))
    };
    let (unit_value, unit_price_with_tax) = if line.quantity > Decimal::ZERO {
        (
            per_unit(split.subtotal, line.quantity)?,
            per_unit(split.total, line.quantity)?,
        )
    } else if line.price_includes_tax {
        (
            per_unit(line.unit_price, Decimal::ONE + rate)?,
            round_half_up(line.unit_price, UNIT_PRICE_DP),
        )
    } else {
        let with_tax = line
            .unit_price
            .checked_mul(Decimal::ONE + rate)
            .ok_or_else(|| overflow("unit price"))?;
        (
            round_half_up(line.unit_price, UNIT_PRICE_DP),
            round_half_up(with_tax, UNIT_PRICE_DP),
        )
    };

    Ok(LineBreakdown {
        subtotal: split.subtotal,
        tax: split.tax,
        total: split.total,
        unit_value,
        unit_price_with_tax,
        rate,
    })
}

/// IGV rate sanity check: the rate must be in `[0, 1)`.
pub fn validate_igv_rate(rate: Decimal) -> Vec<ValidationError> {
    if rate < Decimal::ZERO || rate >= Decimal::ONE {
        vec![ValidationError::new(
            "igv_rate",
            format!("IGV rate {rate} must be in [0, 1)"),
        )]
    } else {
        Vec::new()
    }
}

fn accumulate(sum: &mut Decimal, value: Decimal, what: &str) -> Result<(), CpeError> {
    *sum = sum.checked_add(value).ok_or_else(|| overflow(what))?;
    Ok(())
}

/// Compute the document breakdown as the sum of rounded per-line values.
///
/// # Errors
///
/// `CpeError::Arithmetic` for a rate outside `[0, 1)`, a negative or
/// out-of-range quantity or unit price, or sums that overflow.
pub fn compute_breakdown(
    lines: &[InvoiceLine],
    igv_rate: Decimal,
) -> Result<MonetaryBreakdown, CpeError> {
    if let Some(e) = validate_igv_rate(igv_rate).into_iter().next() {
        return Err(CpeError::Arithmetic(e.message));
    }

    let mut breakdown = MonetaryBreakdown {
        subtotal: Decimal::ZERO,
        tax_amount: Decimal::ZERO,
        total: Decimal::ZERO,
        taxed_base: Decimal::ZERO,
        exonerated_base: Decimal::ZERO,
        unaffected_base: Decimal::ZERO,
        export_base: Decimal::ZERO,
        rate: igv_rate,
        lines: Vec::with_capacity(lines.len()),
    };

    for (i, line) in lines.iter().enumerate() {
        let lb = line_breakdown(line, igv_rate).map_err(|e| match e {
            CpeError::Arithmetic(msg) => CpeError::Arithmetic(format!("line {}: {msg}", i + 1)),
            other => other,
        })?;
        accumulate(&mut breakdown.subtotal, lb.subtotal, "document subtotal")?;
        accumulate(&mut breakdown.tax_amount, lb.tax, "document tax")?;
        let base = match line.tax_affectation {
            TaxAffectation::Taxed => &mut breakdown.taxed_base,
            TaxAffectation::Exonerated => &mut breakdown.exonerated_base,
            TaxAffectation::Unaffected => &mut breakdown.unaffected_base,
            TaxAffectation::Export => &mut breakdown.export_base,
        };
        accumulate(base, lb.subtotal, "category base")?;
        breakdown.lines.push(lb);
    }
    breakdown.total = breakdown
        .subtotal
        .checked_add(breakdown.tax_amount)
        .ok_or_else(|| overflow("document total"))?;

    Ok(breakdown)
}

/// Check that a breakdown is internally consistent. Returns all violations.
pub fn validate_breakdown(breakdown: &MonetaryBreakdown) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for (name, value) in [
        ("subtotal", breakdown.subtotal),
        ("tax_amount", breakdown.tax_amount),
        ("total", breakdown.total),
    ] {
        if round_half_up(value, AMOUNT_DP) != value {
            errors.push(ValidationError::new(
                format!("breakdown.{name}"),
                format!("{value} has more than {AMOUNT_DP} decimal places"),
            ));
        }
    }

    if breakdown.total != breakdown.subtotal + breakdown.tax_amount {
        errors.push(ValidationError::new(
            "breakdown.total",
            format!(
                "total {} != subtotal {} + tax {}",
                breakdown.total, breakdown.subtotal, breakdown.tax_amount
            ),
        ));
    }

    let line_subtotal: Decimal = breakdown.lines.iter().map(|l| l.subtotal).sum();
    let line_tax: Decimal = breakdown.lines.iter().map(|l| l.tax).sum();
    if line_subtotal != breakdown.subtotal {
        errors.push(ValidationError::new(
            "breakdown.subtotal",
            format!("sum of line subtotals {line_subtotal} != {}", breakdown.subtotal),
        ));
    }
    if line_tax != breakdown.tax_amount {
        errors.push(ValidationError::new(
            "breakdown.tax_amount",
            format!("sum of line taxes {line_tax} != {}", breakdown.tax_amount),
        ));
    }

    let bases = breakdown.taxed_base
        + breakdown.exonerated_base
        + breakdown.unaffected_base
        + breakdown.export_base;
    if bases != breakdown.subtotal {
        errors.push(ValidationError::new(
            "breakdown.subtotal",
            format!("category bases {bases} != subtotal {}", breakdown.subtotal),
        ));
    }

    for (i, line) in breakdown.lines.iter().enumerate() {
        if line.total != line.subtotal + line.tax {
            errors.push(ValidationError::new(
                format!("breakdown.lines[{i}].total"),
                format!(
                    "line total {} != subtotal {} + tax {}",
                    line.total, line.subtotal, line.tax
                ),
            ));
        }
    }

    errors
}
