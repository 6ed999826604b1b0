pub mod expression_table;
pub mod tcga_barcodes;
pub mod tcga_merge;
