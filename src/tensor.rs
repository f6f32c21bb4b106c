use crate::shape::Shape;
use crate::tensor::data::{ElementType, HostData, Scalar};
use std::fmt::{Debug, Formatter};

pub mod data;

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TensorDesc {
    pub shape: Shape,
    pub element_type: ElementType,
}

impl TensorDesc {
    pub fn new(element_type: ElementType, extents: &[usize]) -> Self {
        TensorDesc {
            shape: Shape::new(extents),
            element_type,
        }
    }

    pub fn from_shape(element_type: ElementType, shape: Shape) -> Self {
        TensorDesc {
            shape,
            element_type,
        }
    }

    pub fn scalar(element_type: ElementType) -> Self {
        TensorDesc::from_shape(element_type, Shape::scalar())
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn extents(&self) -> &[usize] {
        self.shape.extents()
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn size(&self) -> usize {
        self.shape.size()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.size() * self.element_type.bytes()
    }

    /// Whether `data` could hold the value of a tensor with this descriptor.
    pub fn admits(&self, data: &HostData) -> bool {
        data.element_type() == self.element_type && data.len() == self.size()
    }
}

impl Debug for TensorDesc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.element_type, self.shape)
    }
}

/// Compares two float buffers elementwise within `eps`.
pub fn all_close<T>(t1: &[T], t2: &[T], eps: f64) -> bool
where
    T: Scalar,
{
    (t1.len() == t2.len())
        && t1
            .iter()
            .zip(t2.iter())
            .all(|(v1, v2)| (v1.to_f64() - v2.to_f64()).abs() < eps)
}

#[cfg(test)]
mod tests {
    use crate::tensor::data::{ElementType, HostData};
    use crate::tensor::{all_close, TensorDesc};

    #[test]
    fn test_desc() {
        let desc = TensorDesc::new(ElementType::F32, &[2, 3]);
        assert_eq!(desc.rank(), 2);
        assert_eq!(desc.size(), 6);
        assert_eq!(desc.size_in_bytes(), 24);
        assert_eq!(format!("{:?}", desc), "f32(2, 3)");
        assert_eq!(format!("{:?}", TensorDesc::scalar(ElementType::Boolean)), "boolean()");

        assert!(desc.admits(&HostData::F32(vec![0.0; 6])));
        assert!(!desc.admits(&HostData::F32(vec![0.0; 5])));
        assert!(!desc.admits(&HostData::I32(vec![0; 6])));
    }

    #[test]
    fn test_all_close() {
        assert!(all_close(&[1.0f32, 2.0], &[1.0001, 1.9999], 0.001));
        assert!(!all_close(&[1.0f32, 2.0], &[1.0, 2.1], 0.001));
        assert!(!all_close(&[1.0f32], &[1.0, 2.0], 0.001));
    }
}
