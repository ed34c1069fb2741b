//! Column names shared by the ETL step, the trainer and the prediction server.

/// Regression target.
pub const TARGET: &str = "SalePrice";

/// Raw predictors kept from the source extract, in output order.
pub const RAW_FEATURES: [&str; 21] = [
    "LotArea",
    "OverallQual",
    "OverallCond",
    "YearBuilt",
    "YearRemodAdd",
    "TotalBsmtSF",
    "1stFlrSF",
    "2ndFlrSF",
    "GrLivArea",
    "FullBath",
    "HalfBath",
    "BedroomAbvGr",
    "TotRmsAbvGrd",
    "Fireplaces",
    "GarageCars",
    "GarageArea",
    "WoodDeckSF",
    "OpenPorchSF",
    "PoolArea",
    "YrSold",
    "MoSold",
];

/// Columns computed by the feature engineering step.
pub const DERIVED_FEATURES: [&str; 5] = ["HouseAge", "RemodAge", "TotalSF", "TotalBath", "PricePerSqFt"];

/// The feature schema a trained model expects, in column order.
pub const FEATURES: [&str; 26] = [
    "LotArea",
    "OverallQual",
    "OverallCond",
    "YearBuilt",
    "YearRemodAdd",
    "TotalBsmtSF",
    "1stFlrSF",
    "2ndFlrSF",
    "GrLivArea",
    "FullBath",
    "HalfBath",
    "BedroomAbvGr",
    "TotRmsAbvGrd",
    "Fireplaces",
    "GarageCars",
    "GarageArea",
    "WoodDeckSF",
    "OpenPorchSF",
    "PoolArea",
    "YrSold",
    "MoSold",
    "HouseAge",
    "RemodAge",
    "TotalSF",
    "TotalBath",
    "PricePerSqFt",
];

/// Legacy request field names and the schema names they stand for.
pub const FIELD_ALIASES: [(&str, &str); 2] = [("FirstFlrSF", "1stFlrSF"), ("SecondFlrSF", "2ndFlrSF")];

/// Owned copy of [`FEATURES`], as stored in model artifacts.
pub fn feature_names() -> Vec<String> {
    FEATURES.iter().map(|name| name.to_string()).collect()
}
