//! Region negotiation with the data-access layer.
//!
//! Each input's halo is the elementwise maximum of the half extents of the
//! neighborhood variables that read from it. The output region is padded by
//! that halo and cropped to the input's extent before anything is requested.

use crate::core::error::{BandMathError, BandMathResult};
use crate::core::region::{pad_and_crop, Halo, Region};
use crate::engine::registry::{InputInfo, VariableDescriptor, VariableKind};

/// Halo required for each input, indexed like `inputs`.
pub fn required_halos(active: &[VariableDescriptor], inputs: usize) -> Vec<Halo> {
    let mut halos = vec![Halo::default(); inputs];
    for descriptor in active {
        if let VariableKind::BandNeighborhood { image, size, .. } = &descriptor.kind {
            if let Some(halo) = halos.get_mut(*image) {
                *halo = halo.combine(&size.halo());
            }
        }
    }
    halos
}

/// Region to request from every input for `output`.
///
/// Fails naming the first input whose padded region cannot be satisfied.
pub fn compute_required_regions(output: &Region, halos: &[Halo], inputs: &[InputInfo]) -> BandMathResult<Vec<Region>> {
    inputs
        .iter()
        .zip(halos)
        .enumerate()
        .map(|(index, (input, halo))| {
            pad_and_crop(output, *halo, &input.extent).map_err(|source| BandMathError::RegionNegotiation {
                input: index,
                name: input.name.clone(),
                source,
            })
        })
        .collect()
}
