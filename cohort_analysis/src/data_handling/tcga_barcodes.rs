/// Sample-type code for barcodes without a usable fourth field.
pub const UNKNOWN_CODE: &str = "UNKNOWN";

/// Sample-type code: up to the first two characters of the fourth
/// `-`-separated field (`TCGA-XX-YYYY-01A` → `01`, `TCGA-XX-YYYY-0` → `0`).
pub fn sample_type_code(barcode: &str) -> String {
    barcode
        .trim()
        .split('-')
        .nth(3)
        .filter(|field| !field.is_empty())
        .map(|field| field.chars().take(2).collect())
        .unwrap_or_else(|| UNKNOWN_CODE.to_string())
}

/// GDC sample-type table.
pub fn sample_type_description(code: &str) -> &'static str {
    match code {
        "01" => "Primary Solid Tumor",
        "02" => "Recurrent Solid Tumor",
        "03" => "Primary Blood Derived Cancer",
        "04" => "Recurrent Blood Derived Cancer - Bone Marrow",
        "05" => "Additional - New Primary",
        "06" => "Metastatic",
        "07" => "Additional Metastatic",
        "08" => "Human Tumor Original Cells",
        "09" => "Primary Blood Derived Cancer - Bone Marrow",
        "10" => "Blood Derived Normal",
        "11" => "Solid Tissue Normal",
        "12" => "Buccal Cell Normal",
        "13" => "EBV Immortalized Normal",
        "14" => "Bone Marrow Normal",
        "20" => "Control Analyte",
        "40" => "Recurrent Blood Derived Cancer - Peripheral Blood",
        "50" => "Cell Lines",
        "60" => "Primary Xenograft Tissue",
        "61" => "Cell Line Derived Xenograft Tissue",
        _ => "Other/Unknown",
    }
}
