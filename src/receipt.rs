//! Receipt
//!
//! Plain-text rendering of a count and of the history list, with amounts formatted
//! in the configured currency.

use std::io;

use rust_decimal::Decimal;
use rusty_money::{Money, iso::Currency};
use smallvec::SmallVec;
use tabled::{
    builder::Builder,
    grid::config::HorizontalLine,
    settings::{
        Alignment, Color, Style, Theme,
        object::{Columns, Rows},
    },
};
use thiserror::Error;

use crate::{
    denominations::{Denomination, Kind},
    history::HistoryEntry,
    totals::{Aggregates, TotalsMap},
};

/// Errors that can occur when writing a receipt.
#[derive(Debug, Error)]
pub enum ReceiptError {
    /// IO error
    #[error("IO error")]
    IO,
}

/// One counted denomination.
#[derive(Debug, Clone)]
pub struct ReceiptLine {
    /// Face value
    pub denomination: Denomination,

    /// Effective count
    pub count: u32,

    /// Line total
    pub total: Money<'static, Currency>,
}

/// A count ready to print.
#[derive(Debug, Clone)]
pub struct Receipt {
    /// Counted denominations, coins first
    lines: SmallVec<[ReceiptLine; 10]>,

    /// Subtotals the summary is printed from
    aggregates: Aggregates,

    /// Currency used for all monetary values
    currency: &'static Currency,
}

impl Receipt {
    /// Builds a receipt for `totals`.
    #[must_use]
    pub fn new(totals: &TotalsMap, currency: &'static Currency) -> Self {
        let lines = totals
            .iter()
            .map(|(denomination, line)| ReceiptLine {
                denomination: *denomination,
                count: line.count,
                total: Money::from_decimal(line.total, currency),
            })
            .collect();

        Self {
            lines,
            aggregates: totals.aggregates(),
            currency,
        }
    }

    /// Counted lines.
    #[must_use]
    pub fn lines(&self) -> &[ReceiptLine] {
        &self.lines
    }

    /// Coin subtotal.
    #[must_use]
    pub fn coin_total(&self) -> Money<'static, Currency> {
        self.money(self.aggregates.coin_total)
    }

    /// Note subtotal.
    #[must_use]
    pub fn note_total(&self) -> Money<'static, Currency> {
        self.money(self.aggregates.note_total)
    }

    /// Grand total.
    #[must_use]
    pub fn grand_total(&self) -> Money<'static, Currency> {
        self.money(self.aggregates.grand_total)
    }

    /// Currency used for all monetary values.
    #[must_use]
    pub fn currency(&self) -> &'static Currency {
        self.currency
    }

    /// Writes the table of counted denominations followed by the subtotals.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptError::IO`] if the output cannot be written.
    pub fn write_to(&self, mut out: impl io::Write) -> Result<(), ReceiptError> {
        let mut builder = Builder::default();

        builder.push_record(["Denomination", "Kind", "Count", "Total"]);

        for line in &self.lines {
            builder.push_record([
                line.denomination.to_string(),
                kind_label(line.denomination.kind()).to_string(),
                line.count.to_string(),
                line.total.to_string(),
            ]);
        }

        write_table(&mut out, builder, 2..4)?;

        let coins = format!("{}  ", self.coin_total());
        let notes = format!("{}  ", self.note_total());
        let total = format!("{}  ", self.grand_total());

        let value_width = visible_width(&coins)
            .max(visible_width(&notes))
            .max(visible_width(&total));
        let total_label = " \x1b[1mTotal:\x1b[0m";
        let label_width = visible_width(total_label).max(" Coins:".len());

        write_summary_line(&mut out, " Coins:", &coins, label_width, value_width)?;
        write_summary_line(&mut out, " Notes:", &notes, label_width, value_width)?;
        write_summary_line(
            &mut out,
            total_label,
            &format!("\x1b[1m{total}\x1b[0m"),
            label_width,
            value_width,
        )?;

        writeln!(out).map_err(|_err| ReceiptError::IO)
    }

    fn money(&self, amount: Decimal) -> Money<'static, Currency> {
        Money::from_decimal(amount, self.currency)
    }
}

/// Writes the history list, newest first, as a table of dates and subtotals.
///
/// # Errors
///
/// Returns [`ReceiptError::IO`] if the output cannot be written.
pub fn write_history(
    mut out: impl io::Write,
    entries: &[HistoryEntry],
    currency: &'static Currency,
) -> Result<(), ReceiptError> {
    let mut builder = Builder::default();

    builder.push_record(["Id", "Date", "Coins", "Notes", "Total"]);

    for entry in entries {
        builder.push_record([
            entry.id.clone(),
            entry.date.clone(),
            Money::from_decimal(entry.coin_total, currency).to_string(),
            Money::from_decimal(entry.note_total, currency).to_string(),
            Money::from_decimal(entry.grand_total, currency).to_string(),
        ]);
    }

    write_table(&mut out, builder, 2..5)
}

fn kind_label(kind: Kind) -> &'static str {
    match kind {
        Kind::Coin => "Coin",
        Kind::Note => "Note",
    }
}

fn write_table(
    out: &mut impl io::Write,
    builder: Builder,
    amount_columns: std::ops::Range<usize>,
) -> Result<(), ReceiptError> {
    let mut table = builder.build();
    let mut theme = Theme::from(Style::modern_rounded());

    theme.remove_horizontal_lines();
    theme.insert_horizontal_line(
        1,
        HorizontalLine::new(Some('─'), Some('┼'), Some('├'), Some('┤')),
    );

    table.with(theme);
    table.modify(Rows::first(), Color::BOLD);
    table.modify(Columns::new(amount_columns), Alignment::right());

    writeln!(out, "\n{table}").map_err(|_err| ReceiptError::IO)
}

/// Returns the visible (non-ANSI) width of a string.
fn visible_width(s: &str) -> usize {
    let mut width = 0usize;
    let mut in_escape = false;

    for ch in s.chars() {
        if in_escape {
            in_escape = !ch.is_ascii_alphabetic();
        } else if ch == '\x1b' {
            in_escape = true;
        } else {
            width += 1;
        }
    }

    width
}

/// Writes a summary line with a right-aligned label and a fixed-width value column.
fn write_summary_line(
    out: &mut impl io::Write,
    label: &str,
    value: &str,
    label_width: usize,
    value_width: usize,
) -> Result<(), ReceiptError> {
    let label_pad = label_width.saturating_sub(visible_width(label));
    let value_pad = value_width.saturating_sub(visible_width(value));

    writeln!(
        out,
        "{:label_pad$}{label}  {:value_pad$}{value}",
        "", ""
    )
    .map_err(|_err| ReceiptError::IO)
}
