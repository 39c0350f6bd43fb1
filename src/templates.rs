//! Sample segment markup for testing and demonstration.
//!
//! Each template exercises a different pagination marker.

use std::fmt::Write as _;

use crate::compositor::Segment;

/// Cover segment: heading, summary and a do-not-split contact card.
pub fn cover_template() -> &'static str {
    r##"
<div class="p-6">
    <h1 class="text-3xl font-bold mb-4" style="color: #1a365d">Quarterly Ledger</h1>
    <p class="mb-4">
        Summary of all recorded sales and expenses for the period, grouped by
        account. Amounts are shown in the organisation's base currency.
    </p>
    <div class="avoid-break p-4 mb-4" style="border: 1px solid #d1d5db; background-color: #f9fafb">
        <p class="font-bold">Acme Corp</p>
        <p>123 Business St</p>
        <p>New York, NY 10001</p>
    </div>
</div>
"##
}

/// Ledger segment with `rows` table body rows under a header row.
pub fn ledger_template(rows: usize) -> String {
    let mut html = String::from(
        r##"
<div class="p-6">
    <h2 class="text-2xl font-bold mb-2">Transactions</h2>
    <table class="w-full">
        <thead>
            <tr><th>Date</th><th>Description</th><th>Account</th><th class="text-right">Amount</th></tr>
        </thead>
        <tbody>
"##,
    );
    for i in 0..rows {
        let day = i % 28 + 1;
        let cents = (i * 7919) % 100_000;
        let _ = writeln!(
            html,
            "            <tr><td>2025-03-{day:02}</td><td>Entry {n} &amp; adjustments</td>\
             <td>{account}</td><td class=\"text-right\">{whole}.{frac:02}</td></tr>",
            n = i + 1,
            account = ["Sales", "Expenses", "Payroll", "Tax"][i % 4],
            whole = cents / 100,
            frac = cents % 100,
        );
    }
    html.push_str(
        r##"        </tbody>
    </table>
</div>
"##,
    );
    html
}

/// Notes segment: do-not-split cards with a forced break before the appendix.
pub fn notes_template() -> &'static str {
    r##"
<div class="p-6">
    <h2 class="text-2xl font-bold mb-2">Notes</h2>
    <div class="avoid-break p-4 mb-4" style="border: 1px solid #d1d5db">
        <h3 class="font-bold">1. Revenue recognition</h3>
        <p>Sales are recognised when the invoice is issued. Partial payments are
        tracked against the open balance until the invoice is settled.</p>
    </div>
    <div class="avoid-break p-4 mb-4" style="border: 1px solid #d1d5db">
        <h3 class="font-bold">2. Expenses</h3>
        <p>Expenses are booked at the receipt date. Recurring expenses appear once
        per period; the schedule is listed in the appendix.</p>
    </div>
    <div data-avoid-split class="p-4 mb-4" style="border: 1px solid #d1d5db">
        <h3 class="font-bold">3. Tax</h3>
        <p>Tax is computed per line item at the rate in force on the booking date.</p>
    </div>
    <section class="page-break-before">
        <h2 class="text-2xl font-bold mb-2">Appendix</h2>
        <p>Recurring expense schedule.</p>
        <ul>
            <li>Office rent – monthly</li>
            <li>Software licences – yearly</li>
            <li>Insurance – quarterly</li>
        </ul>
    </section>
</div>
"##
}

/// Minimal template for unit testing.
pub fn minimal_template() -> &'static str {
    "<p>Hello, world!</p>"
}

/// Cover, a ledger long enough to span several pages, and notes.
pub fn sample_segments() -> Vec<Segment> {
    vec![
        Segment::new(cover_template()),
        Segment::new(ledger_template(120)),
        Segment::new(notes_template()),
    ]
}
