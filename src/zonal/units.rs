/// Square metres in one international acre (rounded as in the carbon dataset docs).
pub const SQUARE_METRES_PER_ACRE: f64 = 4046.86;

/// Mass fraction of carbon in CO2 (12 g/mol over 44 g/mol).
pub const CARBON_FRACTION_OF_CO2: f64 = 12.0 / 44.0;

/// Scales an aggregated sum into the reported unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConverter {
    factor: f64,
}

impl UnitConverter {
    pub fn new(factor: f64) -> Self {
        Self { factor }
    }

    /// Converter for a raster of CO2-equivalent per acre into carbon mass per
    /// cell, given the area of one cell in square metres.
    pub fn co2e_per_acre_to_carbon(pixel_area_m2: f64) -> Self {
        Self::new(pixel_area_m2 / SQUARE_METRES_PER_ACRE * CARBON_FRACTION_OF_CO2)
    }

    #[inline] pub fn factor(&self) -> f64 { self.factor }

    #[inline]
    pub fn convert(&self, sum: f64) -> f64 {
        sum * self.factor
    }
}
