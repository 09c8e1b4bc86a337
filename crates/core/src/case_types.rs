//! Case types published by the portal's search form.
//!
//! Queries are not restricted to this list; the portal owns the
//! authoritative set and may add types at any time.

/// (abbreviation, description) pairs, in the portal's dropdown order.
pub const KNOWN_CASE_TYPES: &[(&str, &str)] = &[
    ("ARB.A.", "Arbitration Appeal"),
    ("BAIL APPLN.", "Bail Application"),
    ("C.M.(MAIN)", "Civil Miscellaneous Main"),
    ("C.M.(M)", "Civil Miscellaneous"),
    ("C.O.", "Company Original"),
    ("C.R.", "Civil Revision"),
    ("CRL.A.", "Criminal Appeal"),
    ("CRL.M.C.", "Criminal Miscellaneous"),
    ("CRL.REV.P.", "Criminal Revision Petition"),
    ("CS(COMM)", "Commercial Suit"),
    ("CS(OS)", "Original Suit"),
    ("FAO", "First Appeal from Order"),
    ("LPA", "Letters Patent Appeal"),
    ("MAT.APP.", "Matrimonial Appeal"),
    ("RFA", "Regular First Appeal"),
    ("W.A.", "Writ Appeal"),
    ("W.P.(C)", "Writ Petition Civil"),
    ("W.P.(CRL)", "Writ Petition Criminal"),
];

/// Dropdown label as rendered by the portal, e.g. `"LPA (Letters Patent Appeal)"`.
pub fn display_label(abbreviation: &str, description: &str) -> String {
    format!("{abbreviation} ({description})")
}
