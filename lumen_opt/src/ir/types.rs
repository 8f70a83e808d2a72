//! Variable types for shader storage.
//!
//! Only the shape of a type matters to the I/O passes: how many channels the
//! innermost vector has, whether the base scalar is 64-bit, and whether the
//! element (arrays stripped) is a matrix or a structure.

use std::fmt;

/// Scalar base type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    Float,
    Int,
    Uint,
    Bool,
}

impl BaseType {
    fn prefix(self) -> &'static str {
        match self {
            BaseType::Float => "",
            BaseType::Int => "i",
            BaseType::Uint => "u",
            BaseType::Bool => "b",
        }
    }
}

/// Type of a shader variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VarType {
    /// Scalar (one component) or vector (2..=4 components).
    Vector {
        base: BaseType,
        bit_size: u8,
        components: u8,
    },
    /// Column-major matrix.
    Matrix {
        base: BaseType,
        bit_size: u8,
        columns: u8,
        rows: u8,
    },
    Struct {
        name: String,
        fields: Vec<VarType>,
    },
    Array {
        element: Box<VarType>,
        length: u32,
    },
}

impl VarType {
    /// 32-bit float vector with `components` channels.
    pub fn float(components: u8) -> Self {
        VarType::Vector {
            base: BaseType::Float,
            bit_size: 32,
            components,
        }
    }

    /// 32-bit signed integer vector with `components` channels.
    pub fn int(components: u8) -> Self {
        VarType::Vector {
            base: BaseType::Int,
            bit_size: 32,
            components,
        }
    }

    /// 64-bit float vector with `components` channels.
    pub fn double(components: u8) -> Self {
        VarType::Vector {
            base: BaseType::Float,
            bit_size: 64,
            components,
        }
    }

    pub fn mat(columns: u8, rows: u8) -> Self {
        VarType::Matrix {
            base: BaseType::Float,
            bit_size: 32,
            columns,
            rows,
        }
    }

    pub fn array(element: VarType, length: u32) -> Self {
        VarType::Array {
            element: Box::new(element),
            length,
        }
    }

    /// Strip every array level.
    pub fn without_array(&self) -> &VarType {
        let mut ty = self;
        while let VarType::Array { element, .. } = ty {
            ty = element;
        }
        ty
    }

    pub fn is_array(&self) -> bool {
        matches!(self, VarType::Array { .. })
    }

    pub fn is_matrix(&self) -> bool {
        matches!(self, VarType::Matrix { .. })
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, VarType::Struct { .. })
    }

    /// Whether the base scalar of this (non-aggregate) type is 64-bit.
    pub fn is_64bit(&self) -> bool {
        matches!(
            self,
            VarType::Vector { bit_size: 64, .. } | VarType::Matrix { bit_size: 64, .. }
        )
    }

    /// Channel count of the innermost vector (0 for structures).
    pub fn components(&self) -> u8 {
        match self.without_array() {
            VarType::Vector { components, .. } => *components,
            VarType::Matrix { rows, .. } => *rows,
            _ => 0,
        }
    }

    /// Bit size of the base scalar (0 for structures).
    pub fn bit_size(&self) -> u8 {
        match self.without_array() {
            VarType::Vector { bit_size, .. } | VarType::Matrix { bit_size, .. } => *bit_size,
            _ => 0,
        }
    }

    /// Same array nesting, innermost vector reduced to a single channel.
    ///
    /// Panics on matrices and structures; those are never split.
    pub fn channel_type(&self) -> VarType {
        match self {
            VarType::Vector { base, bit_size, .. } => VarType::Vector {
                base: *base,
                bit_size: *bit_size,
                components: 1,
            },
            VarType::Array { element, length } => VarType::Array {
                element: Box::new(element.channel_type()),
                length: *length,
            },
            other => panic!("no channel type for {other}"),
        }
    }

    /// Number of varying slots the type occupies.
    pub fn slot_count(&self) -> u32 {
        match self {
            VarType::Vector { .. } => 1,
            VarType::Matrix { columns, .. } => *columns as u32,
            VarType::Struct { fields, .. } => fields.iter().map(VarType::slot_count).sum(),
            VarType::Array { element, length } => element.slot_count() * length,
        }
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarType::Vector {
                base,
                bit_size,
                components: 1,
            } => match base {
                BaseType::Float if *bit_size == 64 => write!(f, "double"),
                BaseType::Float => write!(f, "float"),
                BaseType::Int => write!(f, "int"),
                BaseType::Uint => write!(f, "uint"),
                BaseType::Bool => write!(f, "bool"),
            },
            VarType::Vector {
                base,
                bit_size,
                components,
            } => {
                let prefix = if *bit_size == 64 { "d" } else { base.prefix() };
                write!(f, "{prefix}vec{components}")
            }
            VarType::Matrix { columns, rows, .. } if columns == rows => write!(f, "mat{columns}"),
            VarType::Matrix { columns, rows, .. } => write!(f, "mat{columns}x{rows}"),
            VarType::Struct { name, .. } => write!(f, "struct {name}"),
            VarType::Array { element, length } => write!(f, "{element}[{length}]"),
        }
    }
}
