pub mod ring;

pub mod geometry {
    use glam::DVec2;
    use serde::{Deserialize, Serialize};

    /// 经纬度坐标，内部以 `glam::DVec2` 表示（x = 经度，y = 纬度）。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct LatLng(pub DVec2);

    impl LatLng {
        #[inline]
        pub fn new(lat: f64, lng: f64) -> Self {
            Self(DVec2::new(lng, lat))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn lat(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn lng(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        /// 两点的算术平均。平面近似，绘制尺度下足够，不做大地线计算。
        #[inline]
        pub fn midpoint(self, other: LatLng) -> Self {
            Self((self.0 + other.0) * 0.5)
        }

        #[inline]
        pub fn approx_eq(self, other: LatLng, epsilon: f64) -> bool {
            (self.0 - other.0).abs().max_element() <= epsilon
        }
    }

    impl From<DVec2> for LatLng {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// `[lat, lng]` 顺序，与配置文件中的坐标写法一致。
    impl From<[f64; 2]> for LatLng {
        fn from(value: [f64; 2]) -> Self {
            Self::new(value[0], value[1])
        }
    }
}

pub mod vertex {
    use std::fmt;

    use serde::{Deserialize, Serialize};

    use crate::geometry::LatLng;

    /// 顶点标识，在同一个环的生命周期内唯一。
    #[derive(
        Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    )]
    pub struct VertexId(u64);

    impl VertexId {
        #[inline]
        pub fn new(raw: u64) -> Self {
            Self(raw)
        }

        /// 提供原始数值，便于日志输出。
        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    impl fmt::Display for VertexId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    /// 几何顶点。主顶点由用户放置；辅助顶点是两个主顶点之间合成的中点。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vertex {
        pub id: VertexId,
        pub position: LatLng,
        pub is_auxiliary: bool,
    }

    impl Vertex {
        #[inline]
        pub fn primary(id: VertexId, position: LatLng) -> Self {
            Self {
                id,
                position,
                is_auxiliary: false,
            }
        }

        #[inline]
        pub fn auxiliary(id: VertexId, position: LatLng) -> Self {
            Self {
                id,
                position,
                is_auxiliary: true,
            }
        }

        #[inline]
        pub fn is_primary(&self) -> bool {
            !self.is_auxiliary
        }
    }
}

#[cfg(test)]
mod tests {
    use super::geometry::LatLng;
    use super::vertex::{Vertex, VertexId};

    #[test]
    fn latlng_keeps_axis_order() {
        let point = LatLng::new(48.2, 16.4);
        assert_eq!(point.lat(), 48.2);
        assert_eq!(point.lng(), 16.4);
        assert_eq!(point.as_vec2().x, 16.4);

        let from_pair = LatLng::from([1.0, 2.0]);
        assert_eq!(from_pair.lat(), 1.0);
        assert_eq!(from_pair.lng(), 2.0);
    }

    #[test]
    fn midpoint_is_arithmetic_mean() {
        let a = LatLng::new(10.0, -4.0);
        let b = LatLng::new(20.0, 6.0);
        let mid = a.midpoint(b);
        assert!((mid.lat() - 15.0).abs() < 1e-9);
        assert!((mid.lng() - 1.0).abs() < 1e-9);
        assert!(mid.approx_eq(b.midpoint(a), 1e-12));
    }

    #[test]
    fn vertex_constructors_set_role() {
        let id = VertexId::new(7);
        let primary = Vertex::primary(id, LatLng::new(0.0, 0.0));
        let auxiliary = Vertex::auxiliary(id, LatLng::new(0.0, 0.0));
        assert!(primary.is_primary());
        assert!(auxiliary.is_auxiliary);
        assert_eq!(id.to_string(), "7");
    }
}
