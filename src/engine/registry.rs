//! Variable registry.
//!
//! Every name an expression may reference is described here. Declaring an
//! input generates its whole catalogue up front (pixel vector, band scalars,
//! every odd neighborhood up to [`MAX_NEIGHBORHOOD_RADIUS`], spacing and band
//! statistics), so a name collides with user declarations the same way no
//! matter which side was declared first.

use crate::core::error::RegistryError;
use crate::core::raster::ImageGeometry;
use crate::core::region::{Halo, Region};
use crate::core::statistics::BandStatistics;
use crate::expr::value::{Matrix, Scalar};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest neighborhood half extent; windows go from 1x1 to 21x21.
pub const MAX_NEIGHBORHOOD_RADIUS: u32 = 10;

/// Pixel index variable names.
pub const INDEX_X: &str = "idxX";
pub const INDEX_Y: &str = "idxY";

/// Names that would read as operators or built-in constants.
const RESERVED: &[&str] = &["mlt", "dv", "pw", "_pi", "_e"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
}

/// Per-band statistic exposed as `<name>b<k><suffix>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatisticKind {
    Min,
    Max,
    Mean,
    Sum,
    Variance,
}

impl StatisticKind {
    pub const ALL: [StatisticKind; 5] = [
        StatisticKind::Min,
        StatisticKind::Max,
        StatisticKind::Mean,
        StatisticKind::Sum,
        StatisticKind::Variance,
    ];

    /// Suffix used in variable names.
    pub fn suffix(&self) -> &'static str {
        match self {
            StatisticKind::Min => "Min",
            StatisticKind::Max => "Max",
            StatisticKind::Mean => "Mean",
            StatisticKind::Sum => "Sum",
            StatisticKind::Variance => "Var",
        }
    }

    /// Read this statistic from a band summary.
    pub fn pick(&self, stats: &BandStatistics) -> f64 {
        match self {
            StatisticKind::Min => stats.min,
            StatisticKind::Max => stats.max,
            StatisticKind::Mean => stats.mean,
            StatisticKind::Sum => stats.sum,
            StatisticKind::Variance => stats.variance,
        }
    }
}

/// Size of a neighborhood window. Matrix convention: `width` columns by
/// `height` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NeighborhoodSize {
    pub width: u32,
    pub height: u32,
}

impl NeighborhoodSize {
    /// Half extents of the window.
    pub fn halo(&self) -> Halo {
        Halo::new(self.width / 2, self.height / 2)
    }

    /// Number of elements in the window.
    pub fn len(&self) -> usize {
        (self.width * self.height) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for NeighborhoodSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// What a variable name stands for. Bands are 0-based here; names are 1-based.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableKind {
    /// Current pixel coordinate.
    Index(Axis),
    /// Signed pixel spacing of an input.
    Spacing { image: usize, axis: Axis },
    /// All bands of the current pixel, as a `1 x bands` vector.
    PixelVector { image: usize },
    /// One band of the current pixel.
    BandScalar { image: usize, band: usize },
    /// Window of one band centered on the current pixel.
    BandNeighborhood {
        image: usize,
        band: usize,
        size: NeighborhoodSize,
    },
    /// Whole-image statistic of one band.
    BandStatistic {
        image: usize,
        band: usize,
        statistic: StatisticKind,
    },
    UserConstant(Scalar),
    UserMatrix(Matrix),
}

/// A named variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDescriptor {
    pub name: String,
    pub kind: VariableKind,
}

/// What the registry keeps about a declared input.
#[derive(Debug, Clone, PartialEq)]
pub struct InputInfo {
    /// Variable-name prefix.
    pub name: String,
    pub bands: usize,
    pub geometry: ImageGeometry,
    pub extent: Region,
}

/// Catalogue of every declared variable.
#[derive(Debug, Clone)]
pub struct VariableRegistry {
    variables: IndexMap<String, VariableKind>,
    inputs: Vec<InputInfo>,
}

impl VariableRegistry {
    /// Create a registry holding only the pixel index variables.
    pub fn new() -> Self {
        let mut variables = IndexMap::new();
        variables.insert(INDEX_X.to_string(), VariableKind::Index(Axis::X));
        variables.insert(INDEX_Y.to_string(), VariableKind::Index(Axis::Y));
        Self {
            variables,
            inputs: Vec::new(),
        }
    }

    /// Register an input and generate its variables. Returns the input index.
    ///
    /// Without a name the input is called `im<j+1>`, `j` being its 0-based
    /// position among declared inputs.
    pub fn declare_input(
        &mut self,
        name: Option<&str>,
        bands: usize,
        geometry: ImageGeometry,
        extent: Region,
    ) -> Result<usize, RegistryError> {
        let image = self.inputs.len();
        let prefix = name.map(str::to_string).unwrap_or_else(|| format!("im{}", image + 1));
        validate_name(&prefix)?;

        let generated = input_variables(&prefix, image, bands);
        if let Some(clash) = generated.iter().find(|d| self.variables.contains_key(&d.name)) {
            return Err(RegistryError::DuplicateVariable {
                name: clash.name.clone(),
            });
        }

        log::debug!(
            "Input #{} '{}': {} band(s), {} variables",
            image,
            prefix,
            bands,
            generated.len()
        );
        for descriptor in generated {
            self.variables.insert(descriptor.name, descriptor.kind);
        }
        self.inputs.push(InputInfo {
            name: prefix,
            bands,
            geometry,
            extent,
        });
        Ok(image)
    }

    /// Register a scalar constant.
    pub fn declare_constant(&mut self, name: &str, value: Scalar) -> Result<(), RegistryError> {
        self.insert_user(name, VariableKind::UserConstant(value))
    }

    /// Register a `rows x cols` matrix from row-major values.
    pub fn declare_matrix(&mut self, name: &str, rows: usize, cols: usize, values: Vec<f64>) -> Result<(), RegistryError> {
        let len = values.len();
        let matrix = Matrix::new(rows, cols, values).ok_or_else(|| RegistryError::MatrixShape {
            name: name.to_string(),
            rows,
            cols,
            len,
        })?;
        self.insert_user(name, VariableKind::UserMatrix(matrix))
    }

    fn insert_user(&mut self, name: &str, kind: VariableKind) -> Result<(), RegistryError> {
        validate_name(name)?;
        if self.variables.contains_key(name) {
            return Err(RegistryError::DuplicateVariable { name: name.to_string() });
        }
        self.variables.insert(name.to_string(), kind);
        Ok(())
    }

    /// Look up a name.
    pub fn get(&self, name: &str) -> Option<&VariableKind> {
        self.variables.get(name)
    }

    /// Whether a name is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Number of declared variables, generated ones included.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Declared inputs, in declaration order.
    pub fn inputs(&self) -> &[InputInfo] {
        &self.inputs
    }

    /// All variables in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &VariableKind)> {
        self.variables.iter().map(|(n, k)| (n.as_str(), k))
    }

    /// User constants in declaration order.
    pub fn constants(&self) -> impl Iterator<Item = (&str, Scalar)> {
        self.iter().filter_map(|(n, k)| match k {
            VariableKind::UserConstant(s) => Some((n, *s)),
            _ => None,
        })
    }

    /// User matrices in declaration order.
    pub fn matrices(&self) -> impl Iterator<Item = (&str, &Matrix)> {
        self.iter().filter_map(|(n, k)| match k {
            VariableKind::UserMatrix(m) => Some((n, m)),
            _ => None,
        })
    }

    /// Match identifiers against the catalogue.
    ///
    /// Returns the distinct known variables in order of first reference, or
    /// every unknown name at once.
    pub fn resolve<'a, I>(&self, identifiers: I) -> Result<Vec<VariableDescriptor>, RegistryError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut active: IndexMap<&str, &VariableKind> = IndexMap::new();
        let mut unknown: Vec<String> = Vec::new();

        for name in identifiers {
            match self.variables.get_key_value(name) {
                Some((key, kind)) => {
                    active.entry(key.as_str()).or_insert(kind);
                }
                None => {
                    if !unknown.iter().any(|u| u == name) {
                        unknown.push(name.to_string());
                    }
                }
            }
        }

        if !unknown.is_empty() {
            return Err(RegistryError::UnknownVariables { names: unknown });
        }

        Ok(active
            .into_iter()
            .map(|(name, kind)| VariableDescriptor {
                name: name.to_string(),
                kind: kind.clone(),
            })
            .collect())
    }
}

impl Default for VariableRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_name(name: &str) -> Result<(), RegistryError> {
    let mut chars = name.chars();
    let valid_start = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_start || !valid_rest || RESERVED.contains(&name) {
        return Err(RegistryError::InvalidName { name: name.to_string() });
    }
    Ok(())
}

/// Every variable generated for one input.
fn input_variables(prefix: &str, image: usize, bands: usize) -> Vec<VariableDescriptor> {
    let side = (2 * MAX_NEIGHBORHOOD_RADIUS + 1) as usize;
    let mut out = Vec::with_capacity(3 + bands * (1 + side * side + StatisticKind::ALL.len()));
    let mut push = |name: String, kind: VariableKind| out.push(VariableDescriptor { name, kind });

    push(prefix.to_string(), VariableKind::PixelVector { image });
    push(format!("{}PhyX", prefix), VariableKind::Spacing { image, axis: Axis::X });
    push(format!("{}PhyY", prefix), VariableKind::Spacing { image, axis: Axis::Y });

    for band in 0..bands {
        let k = band + 1;
        push(format!("{}b{}", prefix, k), VariableKind::BandScalar { image, band });

        for rx in 0..=MAX_NEIGHBORHOOD_RADIUS {
            for ry in 0..=MAX_NEIGHBORHOOD_RADIUS {
                let size = NeighborhoodSize {
                    width: 2 * rx + 1,
                    height: 2 * ry + 1,
                };
                push(
                    format!("{}b{}N{}", prefix, k, size),
                    VariableKind::BandNeighborhood { image, band, size },
                );
            }
        }

        for statistic in StatisticKind::ALL {
            push(
                format!("{}b{}{}", prefix, k, statistic.suffix()),
                VariableKind::BandStatistic { image, band, statistic },
            );
        }
    }
    out
}

/// Parse a textual matrix `{ a , b ; c , d }` into `(rows, cols, values)`.
pub fn parse_matrix_definition(definition: &str) -> Result<(usize, usize, Vec<f64>), RegistryError> {
    let invalid = |reason: &str| RegistryError::InvalidMatrixDefinition {
        definition: definition.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = definition.trim();
    let inner = trimmed
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(|| invalid("must start with '{' and end with '}'"))?;

    let mut rows: Vec<Vec<f64>> = Vec::new();
    for row in inner.split(';') {
        let values = row
            .split(',')
            .map(|v| v.trim().parse::<f64>().map_err(|_| invalid(&format!("'{}' is not a number", v.trim()))))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(values);
    }

    let cols = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|r| r.len() != cols) {
        return Err(RegistryError::RaggedMatrix {
            definition: definition.to_string(),
        });
    }
    let count = rows.len();
    Ok((count, cols, rows.into_iter().flatten().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_input(bands: usize) -> VariableRegistry {
        let mut registry = VariableRegistry::new();
        registry
            .declare_input(None, bands, ImageGeometry::default(), Region::from_size(4, 4))
            .unwrap();
        registry
    }

    #[test]
    fn test_generated_names() {
        let registry = registry_with_input(2);
        assert_eq!(registry.get("im1"), Some(&VariableKind::PixelVector { image: 0 }));
        assert_eq!(registry.get("im1b2"), Some(&VariableKind::BandScalar { image: 0, band: 1 }));
        assert_eq!(
            registry.get("im1b1N3x5"),
            Some(&VariableKind::BandNeighborhood {
                image: 0,
                band: 0,
                size: NeighborhoodSize { width: 3, height: 5 }
            })
        );
        assert!(registry.contains("im1b2N21x21"));
        assert!(!registry.contains("im1b1N23x23"));
        assert!(!registry.contains("im1b1N2x2"));
        assert!(registry.contains("im1PhyX"));
        assert!(registry.contains("im1b2Var"));
        assert!(!registry.contains("im1b3"));
        assert!(registry.contains(INDEX_X));
    }

    #[test]
    fn test_default_names_follow_declaration_order() {
        let mut registry = registry_with_input(1);
        let second = registry
            .declare_input(None, 1, ImageGeometry::default(), Region::from_size(4, 4))
            .unwrap();
        assert_eq!(second, 1);
        assert_eq!(registry.inputs()[1].name, "im2");
        assert!(registry.contains("im2b1Mean"));
    }

    #[test]
    fn test_duplicate_constant() {
        let mut registry = registry_with_input(1);
        registry.declare_constant("gain", Scalar::Float(2.0)).unwrap();
        let err = registry.declare_constant("gain", Scalar::Integer(1)).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateVariable { name: "gain".to_string() });

        // Collides with a generated name
        let err = registry.declare_constant("im1b1", Scalar::Integer(1)).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateVariable { .. }));
    }

    #[test]
    fn test_input_colliding_with_constant() {
        let mut registry = VariableRegistry::new();
        registry.declare_constant("im1b1", Scalar::Integer(3)).unwrap();
        let err = registry
            .declare_input(None, 1, ImageGeometry::default(), Region::from_size(2, 2))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateVariable { name: "im1b1".to_string() });
        assert!(registry.inputs().is_empty());
    }

    #[test]
    fn test_invalid_names() {
        let mut registry = VariableRegistry::new();
        assert!(registry.declare_constant("2x", Scalar::Integer(1)).is_err());
        assert!(registry.declare_constant("a-b", Scalar::Integer(1)).is_err());
        assert!(registry.declare_constant("mlt", Scalar::Integer(1)).is_err());
        assert!(registry.declare_constant("_pi", Scalar::Integer(1)).is_err());
    }

    #[test]
    fn test_matrix_shape_checked() {
        let mut registry = VariableRegistry::new();
        let err = registry.declare_matrix("m", 2, 2, vec![1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, RegistryError::MatrixShape { len: 3, .. }));
        registry.declare_matrix("m", 1, 3, vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(registry.matrices().count(), 1);
    }

    #[test]
    fn test_resolve_collects_all_unknowns() {
        let registry = registry_with_input(1);
        let err = registry
            .resolve(["im1b1", "foo", "im2b1", "foo"])
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::UnknownVariables {
                names: vec!["foo".to_string(), "im2b1".to_string()]
            }
        );
    }

    #[test]
    fn test_resolve_deduplicates() {
        let registry = registry_with_input(1);
        let active = registry.resolve(["im1b1", "idxX", "im1b1"]).unwrap();
        let names: Vec<_> = active.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["im1b1", "idxX"]);
    }

    #[test]
    fn test_parse_matrix_definition() {
        let (rows, cols, values) = parse_matrix_definition("{ 1 , 2 , 3 ; 4 , 5 , 6 }").unwrap();
        assert_eq!((rows, cols), (2, 3));
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let err = parse_matrix_definition("{ 1 , 2 ; 3 }").unwrap_err();
        assert!(matches!(err, RegistryError::RaggedMatrix { .. }));
        assert!(parse_matrix_definition("1 , 2").is_err());
        assert!(parse_matrix_definition("{ 1 , x }").is_err());
    }
}
