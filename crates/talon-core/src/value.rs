//! DIE-backed type model and typed value visualization.

use std::cell::Cell;

use crate::dwarf::encoding::*;
use crate::dwarf::{Die, Dwarf};
use crate::error::{Result, TalonError};
use crate::process::Process;
use crate::types::{from_bytes, memcpy_bits, VirtAddr};

/// A type described by a DWARF DIE.
///
/// Wraps the DIE and memoizes the computed byte size. Stripping walks
/// `DW_AT_type` edges while the wrapped tag is in a caller-supplied set,
/// which is how CV qualifiers, typedefs, and references are peeled off
/// before inspecting the underlying type.
#[derive(Clone)]
pub struct Type
{
    die: Die,
    byte_size: Cell<Option<u64>>,
}

impl Type
{
    pub fn new(die: Die) -> Self
    {
        Type {
            die,
            byte_size: Cell::new(None),
        }
    }

    /// The wrapped DIE.
    pub fn get_die(&self) -> &Die
    {
        &self.die
    }

    /// The type named by this type's `DW_AT_type` attribute.
    pub fn value_type(&self, dwarf: &Dwarf) -> Result<Type>
    {
        Ok(Type::new(self.die.attr(DW_AT_type)?.as_reference(dwarf)?))
    }

    /// Size of a value of this type in bytes, memoized.
    ///
    /// - Pointers are 8 bytes; member pointers are 8, or 16 when they
    ///   point at a member function.
    /// - Arrays multiply the element size across every subrange child.
    /// - Otherwise `DW_AT_byte_size` wins, then the referenced type, then
    ///   zero.
    pub fn byte_size(&self, dwarf: &Dwarf) -> Result<u64>
    {
        if let Some(size) = self.byte_size.get() {
            return Ok(size);
        }
        let size = self.compute_byte_size(dwarf)?;
        self.byte_size.set(Some(size));
        Ok(size)
    }

    fn compute_byte_size(&self, dwarf: &Dwarf) -> Result<u64>
    {
        let tag = self.die.tag();

        if tag == DW_TAG_pointer_type {
            return Ok(8);
        }
        if tag == DW_TAG_ptr_to_member_type {
            let member_type = self.value_type(dwarf)?;
            if member_type.get_die().tag() == DW_TAG_subrange_type {
                return Ok(16);
            }
            return Ok(8);
        }
        if tag == DW_TAG_array_type {
            let mut size = self.value_type(dwarf)?.byte_size(dwarf)?;
            for child in self.die.children(dwarf) {
                let child = child?;
                if child.tag() == DW_TAG_subrange_type {
                    size *= child.attr(DW_AT_upper_bound)?.as_int(dwarf)? + 1;
                }
            }
            return Ok(size);
        }
        if self.die.contains(DW_AT_byte_size) {
            return self.die.attr(DW_AT_byte_size)?.as_int(dwarf);
        }
        if self.die.contains(DW_AT_type) {
            return self.value_type(dwarf)?.byte_size(dwarf);
        }
        Ok(0)
    }

    /// Walk `DW_AT_type` while the current tag is in `tags`.
    pub fn strip(&self, dwarf: &Dwarf, tags: &[u64]) -> Result<Type>
    {
        let mut current = self.clone();
        while tags.contains(&current.die.tag()) {
            current = current.value_type(dwarf)?;
        }
        Ok(current)
    }

    /// Strip CV qualifiers and typedefs.
    pub fn strip_cv_typedef(&self, dwarf: &Dwarf) -> Result<Type>
    {
        self.strip(dwarf, &[DW_TAG_const_type, DW_TAG_volatile_type, DW_TAG_typedef])
    }

    /// Strip CV qualifiers, typedefs, and references.
    pub fn strip_cvref_typedef(&self, dwarf: &Dwarf) -> Result<Type>
    {
        self.strip(
            dwarf,
            &[
                DW_TAG_const_type,
                DW_TAG_volatile_type,
                DW_TAG_typedef,
                DW_TAG_reference_type,
                DW_TAG_rvalue_reference_type,
            ],
        )
    }

    /// Strip CV qualifiers, typedefs, references, and pointers.
    pub fn strip_all(&self, dwarf: &Dwarf) -> Result<Type>
    {
        self.strip(
            dwarf,
            &[
                DW_TAG_const_type,
                DW_TAG_volatile_type,
                DW_TAG_typedef,
                DW_TAG_reference_type,
                DW_TAG_rvalue_reference_type,
                DW_TAG_pointer_type,
            ],
        )
    }

    /// Whether this is a character type after CV/typedef stripping.
    // Keeps the original's parse: the base-type check binds to the
    // signed-char comparison only.
    pub fn is_char_type(&self, dwarf: &Dwarf) -> Result<bool>
    {
        let stripped = self.strip_cv_typedef(dwarf)?;
        if !stripped.get_die().contains(DW_AT_encoding) {
            return Ok(false);
        }
        let encoding = stripped.get_die().attr(DW_AT_encoding)?.as_int(dwarf)?;
        Ok((stripped.get_die().tag() == DW_TAG_base_type && encoding == DW_ATE_signed_char)
            || encoding == DW_ATE_unsigned_char)
    }
}

/// A byte buffer tagged with its type and, when known, the virtual
/// address it was read from.
pub struct TypedData
{
    data: Vec<u8>,
    value_type: Type,
    address: Option<VirtAddr>,
}

impl TypedData
{
    pub fn new(data: Vec<u8>, value_type: Type) -> Self
    {
        TypedData {
            data,
            value_type,
            address: None,
        }
    }

    pub fn with_address(data: Vec<u8>, value_type: Type, address: VirtAddr) -> Self
    {
        TypedData {
            data,
            value_type,
            address: Some(address),
        }
    }

    pub fn data(&self) -> &[u8]
    {
        &self.data
    }

    pub fn value_type(&self) -> &Type
    {
        &self.value_type
    }

    pub fn address(&self) -> Option<VirtAddr>
    {
        self.address
    }

    /// Render the value for display, dispatching on the type's tag.
    ///
    /// Pointers to character types are followed into the tracee and shown
    /// as C strings; class-like types are rendered member by member with
    /// bitfield storage fixed up first.
    pub fn visualize(&self, proc: &Process, dwarf: &Dwarf, depth: usize) -> Result<String>
    {
        let die = self.value_type.get_die();
        match die.tag() {
            DW_TAG_base_type => self.visualize_base_type(dwarf),
            DW_TAG_pointer_type => self.visualize_pointer_type(proc, dwarf),
            DW_TAG_ptr_to_member_type => {
                let ptr: u64 = from_bytes(&self.data)?;
                Ok(format!("0x{ptr:x}"))
            }
            DW_TAG_array_type => self.visualize_array_type(proc, dwarf),
            DW_TAG_class_type | DW_TAG_structure_type | DW_TAG_union_type => {
                self.visualize_class_type(proc, dwarf, depth)
            }
            DW_TAG_enumeration_type | DW_TAG_typedef | DW_TAG_const_type
            | DW_TAG_volatile_type => {
                let inner = self.value_type.value_type(dwarf)?;
                TypedData::new(self.data.clone(), inner).visualize(proc, dwarf, 0)
            }
            tag => Err(TalonError::InvalidArgument(format!(
                "unsupported type tag 0x{tag:x} for visualization"
            ))),
        }
    }

    fn visualize_base_type(&self, dwarf: &Dwarf) -> Result<String>
    {
        let die = self.value_type.get_die();
        let bytes = self.data.as_slice();
        let size = self.value_type.byte_size(dwarf)? as usize;

        match die.attr(DW_AT_encoding)?.as_int(dwarf)? {
            DW_ATE_boolean => Ok(if bytes[0] != 0 { "true" } else { "false" }.to_string()),
            DW_ATE_float => match die.name(dwarf)?.as_deref() {
                Some("float") => Ok(format!("{}", from_bytes::<f32>(bytes)?)),
                Some("double") => Ok(format!("{}", from_bytes::<f64>(bytes)?)),
                _ => Err(TalonError::InvalidArgument(
                    "unsupported floating point type".into(),
                )),
            },
            DW_ATE_signed => match size {
                1 => Ok(format!("{}", from_bytes::<i8>(bytes)?)),
                2 => Ok(format!("{}", from_bytes::<i16>(bytes)?)),
                4 => Ok(format!("{}", from_bytes::<i32>(bytes)?)),
                8 => Ok(format!("{}", from_bytes::<i64>(bytes)?)),
                _ => Err(TalonError::InvalidArgument("unsupported signed integer size".into())),
            },
            DW_ATE_unsigned => match size {
                1 => Ok(format!("{}", from_bytes::<u8>(bytes)?)),
                2 => Ok(format!("{}", from_bytes::<u16>(bytes)?)),
                4 => Ok(format!("{}", from_bytes::<u32>(bytes)?)),
                8 => Ok(format!("{}", from_bytes::<u64>(bytes)?)),
                _ => Err(TalonError::InvalidArgument(
                    "unsupported unsigned integer size".into(),
                )),
            },
            DW_ATE_signed_char => Ok(format!("{}", from_bytes::<i8>(bytes)?)),
            DW_ATE_unsigned_char => Ok(format!("{}", from_bytes::<u8>(bytes)?)),
            DW_ATE_UTF => Err(TalonError::InvalidArgument("DW_ATE_UTF is not implemented".into())),
            other => Err(TalonError::InvalidArgument(format!(
                "unsupported base type encoding 0x{other:x}"
            ))),
        }
    }

    fn visualize_pointer_type(&self, proc: &Process, dwarf: &Dwarf) -> Result<String>
    {
        let ptr: u64 = from_bytes(&self.data)?;
        if ptr == 0 {
            return Ok("0x0".to_string());
        }
        let pointee = self.value_type.value_type(dwarf)?;
        if pointee.is_char_type(dwarf)? {
            let string = proc.read_string(VirtAddr::new(ptr))?;
            return Ok(format!("\"{string}\""));
        }
        Ok(format!("0x{ptr:x}"))
    }

    fn visualize_array_type(&self, proc: &Process, dwarf: &Dwarf) -> Result<String>
    {
        let die = self.value_type.get_die();
        let mut dimensions = Vec::new();
        for child in die.children(dwarf) {
            let child = child?;
            if child.tag() == DW_TAG_subrange_type {
                dimensions.push(child.attr(DW_AT_upper_bound)?.as_int(dwarf)? + 1);
            }
        }
        dimensions.reverse();
        let value_type = self.value_type.value_type(dwarf)?;
        visualize_subrange(proc, dwarf, &value_type, &self.data, &dimensions)
    }

    fn visualize_class_type(&self, proc: &Process, dwarf: &Dwarf, depth: usize) -> Result<String>
    {
        let die = self.value_type.get_die();
        let mut out = String::from("{\n");
        for child in die.children(dwarf) {
            let child = child?;
            let is_member = child.tag() == DW_TAG_member;
            if !((is_member && child.contains(DW_AT_data_member_location))
                || child.contains(DW_AT_data_bit_offset))
            {
                continue;
            }
            let indent = "\t".repeat(depth + 1);
            let byte_offset = if child.contains(DW_AT_data_member_location) {
                child.attr(DW_AT_data_member_location)?.as_int(dwarf)?
            } else {
                child.attr(DW_AT_data_bit_offset)?.as_int(dwarf)? / 8
            } as usize;
            let subtype = Type::new(child.attr(DW_AT_type)?.as_reference(dwarf)?);
            let size = subtype.byte_size(dwarf)? as usize;
            let member_bytes = self
                .data
                .get(byte_offset..byte_offset + size)
                .ok_or_else(|| {
                    TalonError::InvalidArgument("member offset outside value buffer".into())
                })?
                .to_vec();
            let member = TypedData::new(member_bytes, subtype)
                .fixup_bitfield(dwarf, &child)?;
            let rendered = member.visualize(proc, dwarf, depth)?;
            let name = child.name(dwarf)?.unwrap_or_else(|| "<unnamed>".to_string());
            out.push_str(&format!("{indent}{name}: {rendered}\n"));
        }
        out.push_str(&"\t".repeat(depth));
        out.push('}');
        Ok(out)
    }

    /// Left-align bitfield storage at bit zero.
    ///
    /// For a member with bitfield geometry, copies the member's bits into
    /// a fresh buffer of the storage size starting at bit 0; ordinary
    /// members are returned unchanged.
    pub fn fixup_bitfield(self, dwarf: &Dwarf, member_die: &Die) -> Result<TypedData>
    {
        let stripped = self.value_type.strip_cv_typedef(dwarf)?;
        let storage_size = stripped.byte_size(dwarf)?;
        let Some((bit_size, storage_byte_size, bit_offset)) =
            member_die.get_bitfield_information(dwarf, storage_size)?
        else {
            return Ok(self);
        };

        let mut fixed = vec![0u8; storage_byte_size as usize];
        memcpy_bits(&mut fixed, 0, &self.data, bit_offset as usize, bit_size as usize);
        Ok(TypedData::new(fixed, self.value_type))
    }
}

fn visualize_subrange(
    proc: &Process,
    dwarf: &Dwarf,
    value_type: &Type,
    data: &[u8],
    dimensions: &[u64],
) -> Result<String>
{
    let Some((&size, rest)) = dimensions.split_last() else {
        return TypedData::new(data.to_vec(), value_type.clone()).visualize(proc, dwarf, 0);
    };

    let sub_size: u64 = rest.iter().product::<u64>() * value_type.byte_size(dwarf)?;

    let mut out = String::from("[");
    for i in 0..size {
        let offset = (i * sub_size) as usize;
        let sub = data.get(offset..).unwrap_or(&[]);
        out.push_str(&visualize_subrange(proc, dwarf, value_type, sub, rest)?);
        if i != size - 1 {
            out.push_str(", ");
        }
    }
    out.push(']');
    Ok(out)
}
