//! Broadcast binding algebra between a net expression and an endpoint
//! expression.

use thiserror::Error;

use super::expand::ExprShape;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("net expands to {net} atoms but endpoint expands to {endpoint}")]
    LengthMismatch { net: usize, endpoint: usize },
    #[error("axis '{axis}' has size {net} on the net but {endpoint} on the endpoint")]
    AxisSize {
        axis: String,
        net: usize,
        endpoint: usize,
    },
    #[error("{side} expression has anonymous pattern groups, which cannot broadcast")]
    NotClosed { side: &'static str },
    #[error("net axis '{axis}' does not appear in endpoint axis order")]
    AxisOrder { axis: String },
    #[error("spliced expressions bind only by equal length or as a scalar")]
    SplicedBroadcast,
}

/// How endpoint atoms map onto net atoms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingPlan {
    pub net_len: usize,
    pub endpoint_len: usize,
    /// `net_map[endpoint_index]` is the net atom that endpoint atom binds to.
    pub net_map: Vec<u32>,
    pub shared_axes: Vec<String>,
    pub broadcast_axes: Vec<String>,
}

impl BindingPlan {
    pub fn index_map(&self, endpoint_index: usize) -> usize {
        self.net_map[endpoint_index] as usize
    }
}

/// Compute the binding between a net expression shape and an endpoint
/// expression shape.
///
/// Equal lengths pair by index; a scalar net accepts every endpoint atom;
/// otherwise the named-axis broadcast rules apply.
pub fn bind(net: &ExprShape, endpoint: &ExprShape) -> Result<BindingPlan, BindError> {
    if net.len == endpoint.len {
        return Ok(BindingPlan {
            net_len: net.len,
            endpoint_len: endpoint.len,
            net_map: (0..endpoint.len as u32).collect(),
            shared_axes: shared_named_axes(net, endpoint),
            broadcast_axes: Vec::new(),
        });
    }

    if net.len == 1 {
        return Ok(BindingPlan {
            net_len: 1,
            endpoint_len: endpoint.len,
            net_map: vec![0; endpoint.len],
            shared_axes: Vec::new(),
            broadcast_axes: named_axes(endpoint),
        });
    }

    broadcast(net, endpoint)
}

fn named_axes(shape: &ExprShape) -> Vec<String> {
    shape.axes.iter().filter_map(|a| a.id.clone()).collect()
}

fn shared_named_axes(net: &ExprShape, endpoint: &ExprShape) -> Vec<String> {
    let endpoint_ids = named_axes(endpoint);
    named_axes(net)
        .into_iter()
        .filter(|id| endpoint_ids.contains(id))
        .collect()
}

fn broadcast(net: &ExprShape, endpoint: &ExprShape) -> Result<BindingPlan, BindError> {
    // Mixed-radix decomposition below is only meaningful for single-segment
    // expressions; splices bind by equal length or scalar alone.
    if net.segments != 1 || endpoint.segments != 1 {
        return Err(BindError::SplicedBroadcast);
    }
    if net.axes.iter().any(|a| a.id.is_none()) {
        return Err(BindError::NotClosed { side: "net" });
    }
    if endpoint.axes.iter().any(|a| a.id.is_none()) {
        return Err(BindError::NotClosed { side: "endpoint" });
    }

    // The net's axis sequence must occur as a left-to-right subsequence of
    // the endpoint's, with matching sizes on every shared axis.
    let mut shared = Vec::with_capacity(net.axes.len());
    let mut cursor = 0usize;
    for net_axis in &net.axes {
        let id = net_axis.id.as_deref().expect("checked closed");
        let found = endpoint.axes[cursor..]
            .iter()
            .position(|a| a.id.as_deref() == Some(id));
        match found {
            Some(offset) => {
                let at = cursor + offset;
                if endpoint.axes[at].size != net_axis.size {
                    return Err(BindError::AxisSize {
                        axis: id.to_string(),
                        net: net_axis.size,
                        endpoint: endpoint.axes[at].size,
                    });
                }
                shared.push(id.to_string());
                cursor = at + 1;
            }
            None => {
                return Err(BindError::AxisOrder {
                    axis: id.to_string(),
                })
            }
        }
    }

    let broadcast_axes: Vec<String> = endpoint
        .axes
        .iter()
        .filter_map(|a| a.id.clone())
        .filter(|id| !shared.contains(id))
        .collect();
    let extra: usize = endpoint
        .axes
        .iter()
        .filter(|a| {
            let id = a.id.as_deref().expect("checked closed");
            !shared.iter().any(|s| s == id)
        })
        .map(|a| a.size)
        .product();
    if net.len.saturating_mul(extra) != endpoint.len {
        return Err(BindError::LengthMismatch {
            net: net.len,
            endpoint: endpoint.len,
        });
    }

    // Strides with the rightmost axis varying fastest, matching expansion.
    let endpoint_strides = strides(endpoint);
    let net_strides = strides(net);

    let mut net_map = Vec::with_capacity(endpoint.len);
    for e_idx in 0..endpoint.len {
        let mut n_idx = 0usize;
        for (axis_pos, axis) in endpoint.axes.iter().enumerate() {
            let id = axis.id.as_deref().expect("checked closed");
            if let Some(net_pos) = net
                .axes
                .iter()
                .position(|a| a.id.as_deref() == Some(id))
            {
                let coord = (e_idx / endpoint_strides[axis_pos]) % axis.size;
                n_idx += coord * net_strides[net_pos];
            }
        }
        net_map.push(n_idx as u32);
    }

    Ok(BindingPlan {
        net_len: net.len,
        endpoint_len: endpoint.len,
        net_map,
        shared_axes: shared,
        broadcast_axes,
    })
}

fn strides(shape: &ExprShape) -> Vec<usize> {
    let mut strides = vec![1usize; shape.axes.len()];
    for i in (0..shape.axes.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape.axes[i + 1].size;
    }
    strides
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::expand::{shape, AxisTable};
    use crate::pattern::parse::parse_pattern;

    fn shape_of(raw: &str) -> ExprShape {
        shape(&parse_pattern(raw).unwrap(), &AxisTable::new()).unwrap()
    }

    #[test]
    fn equal_length_is_identity() {
        let plan = bind(&shape_of("d<a=p|n>"), &shape_of("MN<a=p|n>.d")).unwrap();
        assert_eq!(plan.net_map, vec![0, 1]);
        assert_eq!(plan.shared_axes, vec!["a"]);
    }

    #[test]
    fn scalar_net_collects_everything() {
        let plan = bind(&shape_of("VSS"), &shape_of("MN<p|n>.s")).unwrap();
        assert_eq!(plan.net_map, vec![0, 0]);
    }

    #[test]
    fn broadcast_replicates_over_extra_axes() {
        // Net: 2 atoms over axis `a`; endpoint: 6 atoms over axes `b` x `a`.
        let plan = bind(&shape_of("n<a=p|n>"), &shape_of("I<b=1|2|3>_<a=p|n>.d")).unwrap();
        assert_eq!(plan.shared_axes, vec!["a"]);
        assert_eq!(plan.broadcast_axes, vec!["b"]);
        // Endpoint order: (b,a) with a fastest: (1,p)(1,n)(2,p)(2,n)(3,p)(3,n)
        assert_eq!(plan.net_map, vec![0, 1, 0, 1, 0, 1]);
        // Each net atom receives exactly K = 3 endpoints.
        for n in 0..2u32 {
            assert_eq!(plan.net_map.iter().filter(|&&m| m == n).count(), 3);
        }
    }

    #[test]
    fn broadcast_requires_subsequence_order() {
        // Net orders axes (a, b); endpoint orders them (b, a).
        let err = bind(
            &shape_of("n<a=p|n>_<b=1|2>"),
            &shape_of("I<b=1|2>_<a=p|n>.d"),
        )
        .unwrap_err();
        assert!(matches!(err, BindError::AxisOrder { .. }));
    }

    #[test]
    fn shared_axis_sizes_must_match() {
        let err = bind(&shape_of("n<a=p|n>"), &shape_of("I<a=p|n|z>.d")).unwrap_err();
        assert_eq!(
            err,
            BindError::AxisSize {
                axis: "a".into(),
                net: 2,
                endpoint: 3
            }
        );
    }

    #[test]
    fn anonymous_groups_cannot_broadcast() {
        let err = bind(&shape_of("n<p|n>"), &shape_of("I<1|2>_<a=p|n>.d")).unwrap_err();
        assert_eq!(err, BindError::NotClosed { side: "net" });
    }

    #[test]
    fn spliced_expressions_cannot_broadcast() {
        // 3 net atoms across two segments against 4 endpoint atoms.
        let err = bind(&shape_of("n<a=p|n>;m"), &shape_of("I<a=p|n>_<b=1|2>.d")).unwrap_err();
        assert_eq!(err, BindError::SplicedBroadcast);
    }

    #[test]
    fn other_length_mismatches_fail() {
        let err = bind(&shape_of("n<1:3>"), &shape_of("I<1:4>.d")).unwrap_err();
        assert!(matches!(err, BindError::NotClosed { .. } | BindError::LengthMismatch { .. }));
    }

    #[test]
    fn identity_binding_is_a_bijection() {
        let net = shape_of("x<a=1|2>_<b=p|n>");
        let ep = shape_of("y<a=1|2>_<b=p|n>.g");
        let plan = bind(&net, &ep).unwrap();
        let mut seen: Vec<bool> = vec![false; plan.net_len];
        for &m in &plan.net_map {
            assert!(!seen[m as usize]);
            seen[m as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }
}
