use crate::math::{FRACBITS, Fixed, fixed_mul};
use crate::world::geometry::{Level, Node, NodeChild, Seg, SubsectorId};

/// Leaf marker of 32-bit (extended) node formats.
pub const NF_SUBSECTOR: u32 = 0x8000_0000;
/// Leaf marker of the classic 16-bit node format.
pub const NF_SUBSECTOR_16: u16 = 0x8000;

// ──────────────────────────────────────────────────────────────────────────
//                       NodeChild – decoding
// ──────────────────────────────────────────────────────────────────────────
impl NodeChild {
    /// Decode a 32-bit child index.  `0xFFFF_FFFF`, written by some node
    /// builders for an empty leaf, maps to subsector 0.
    pub fn from_raw(raw: u32) -> Self {
        if raw == u32::MAX {
            NodeChild::Subsector(0)
        } else if raw & NF_SUBSECTOR != 0 {
            NodeChild::Subsector((raw & !NF_SUBSECTOR) as usize)
        } else {
            NodeChild::Node(raw as usize)
        }
    }

    /// Decode a classic 16-bit child index.
    pub fn from_raw16(raw: u16) -> Self {
        if raw == u16::MAX {
            NodeChild::Subsector(0)
        } else if raw & NF_SUBSECTOR_16 != 0 {
            NodeChild::Subsector((raw & !NF_SUBSECTOR_16) as usize)
        } else {
            NodeChild::Node(raw as usize)
        }
    }
}

// ──────────────────────────────────────────────────────────────────────────
//                       Level – public helpers
// ──────────────────────────────────────────────────────────────────────────
impl Level {
    /// Root of the BSP tree.  A level without nodes is a single leaf.
    #[inline]
    pub fn bsp_root(&self) -> NodeChild {
        match self.nodes.len() {
            0 => NodeChild::Subsector(0),
            n => NodeChild::Node(n - 1),
        }
    }

    /// Walk the BSP and return the subsector containing `(x, y)`.
    pub fn point_in_subsector(&self, x: Fixed, y: Fixed) -> SubsectorId {
        let mut child = self.bsp_root();
        loop {
            match child {
                NodeChild::Subsector(ss) => return ss,
                NodeChild::Node(n) => {
                    let node = &self.nodes[n];
                    child = node.children[point_on_side(x, y, node)];
                }
            }
        }
    }

    /// Side of `seg` that `(x, y)` lies on (0 = front, 1 = back).
    #[inline]
    pub fn point_on_seg_side(&self, x: Fixed, y: Fixed, seg: &Seg) -> usize {
        let v1 = &self.vertices[seg.v1];
        let v2 = &self.vertices[seg.v2];
        point_on_line_side(x, y, v1.x, v1.y, v2.x - v1.x, v2.y - v1.y)
    }
}

// ──────────────────────────────────────────────────────────────────────────
//                       Side tests
// ──────────────────────────────────────────────────────────────────────────

/// 0 = *front* of the partition (right of its direction), 1 = *back*.
#[inline]
pub fn point_on_side(x: Fixed, y: Fixed, node: &Node) -> usize {
    point_on_line_side(x, y, node.x, node.y, node.dx, node.dy)
}

/// Side test against the line through `(lx, ly)` with direction
/// `(ldx, ldy)`.  Axis-aligned lines and differing sign bits are decided
/// without multiplying.
#[inline]
pub fn point_on_line_side(x: Fixed, y: Fixed, lx: Fixed, ly: Fixed, ldx: Fixed, ldy: Fixed) -> usize {
    if ldx == 0 {
        return if x <= lx { (ldy > 0) as usize } else { (ldy < 0) as usize };
    }
    if ldy == 0 {
        return if y <= ly { (ldx < 0) as usize } else { (ldx > 0) as usize };
    }
    cross_side(x.wrapping_sub(lx), y.wrapping_sub(ly), ldx, ldy)
}

/// General path of the side test with `(x, y)` already relative to the
/// line origin.
#[inline]
fn cross_side(x: Fixed, y: Fixed, ldx: Fixed, ldy: Fixed) -> usize {
    if (ldy ^ ldx ^ x ^ y) < 0 {
        // (left is negative)
        return ((ldy ^ x) < 0) as usize;
    }
    (fixed_mul(y, ldx >> FRACBITS) >= fixed_mul(ldy >> FRACBITS, x)) as usize
}

// ──────────────────────────────────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::FRACUNIT;
    use proptest::prelude::*;

    fn node(x: i32, y: i32, dx: i32, dy: i32) -> Node {
        Node {
            x: x * FRACUNIT,
            y: y * FRACUNIT,
            dx: dx * FRACUNIT,
            dy: dy * FRACUNIT,
            bbox: [[0; 4]; 2],
            children: [NodeChild::Subsector(0), NodeChild::Subsector(1)],
        }
    }

    #[test]
    fn decode_children() {
        assert_eq!(NodeChild::from_raw(5), NodeChild::Node(5));
        assert_eq!(NodeChild::from_raw(NF_SUBSECTOR | 7), NodeChild::Subsector(7));
        assert_eq!(NodeChild::from_raw(u32::MAX), NodeChild::Subsector(0));
        assert_eq!(NodeChild::from_raw16(0x8003), NodeChild::Subsector(3));
        assert_eq!(NodeChild::from_raw16(0xFFFF), NodeChild::Subsector(0));
        assert_eq!(NodeChild::from_raw16(12), NodeChild::Node(12));
    }

    #[test]
    fn front_is_right_of_direction() {
        // partition pointing north along x = 0
        let n = node(0, 0, 0, 64);
        assert_eq!(point_on_side(10 * FRACUNIT, 0, &n), 0);
        assert_eq!(point_on_side(-10 * FRACUNIT, 0, &n), 1);

        // diagonal partition pointing north-east
        let n = node(0, 0, 64, 64);
        assert_eq!(point_on_side(32 * FRACUNIT, -32 * FRACUNIT, &n), 0);
        assert_eq!(point_on_side(-32 * FRACUNIT, 32 * FRACUNIT, &n), 1);
    }

    #[test]
    fn empty_tree_locates_subsector_zero() {
        let lvl = Level::default();
        assert_eq!(lvl.bsp_root(), NodeChild::Subsector(0));
        assert_eq!(lvl.point_in_subsector(123, 456), 0);
    }

    proptest! {
        /// The axis-aligned shortcuts must agree with the general
        /// cross-product path away from the partition line itself.
        #[test]
        fn vertical_shortcut_agrees_with_general_path(
            px in -4000i32..4000, dist in 1i32..4000, left in any::<bool>(),
            y in -4000i32..4000, len in 1i32..2000, north in any::<bool>(),
        ) {
            let dx_rel = if left { -dist } else { dist } * FRACUNIT;
            let dy = if north { len } else { -len } * FRACUNIT;
            let lx = px * FRACUNIT;
            let fast = point_on_line_side(lx + dx_rel, y * FRACUNIT, lx, 0, 0, dy);
            let slow = cross_side(dx_rel, y * FRACUNIT, 0, dy);
            prop_assert_eq!(fast, slow);
        }

        #[test]
        fn horizontal_shortcut_agrees_with_general_path(
            py in -4000i32..4000, dist in 1i32..4000, below in any::<bool>(),
            x in -4000i32..4000, len in 1i32..2000, east in any::<bool>(),
        ) {
            let dy_rel = if below { -dist } else { dist } * FRACUNIT;
            let dx = if east { len } else { -len } * FRACUNIT;
            let ly = py * FRACUNIT;
            let fast = point_on_line_side(x * FRACUNIT, ly + dy_rel, 0, ly, dx, 0);
            let slow = cross_side(x * FRACUNIT, dy_rel, dx, 0);
            prop_assert_eq!(fast, slow);
        }
    }
}
