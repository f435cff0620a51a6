use std::collections::HashMap;
use std::rc::Rc;

use encoding_rs::Encoding;
use thiserror::Error;

use crate::description::{BlockDescription, FieldFunctionKind, FieldType, PhysicalType};
use crate::id::BlockId;
use crate::value::ByteOrder;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SpecificationError {
    #[error("block {0} is described twice")]
    Duplicate(BlockId),
    #[error("parent of {0} is not described")]
    UnknownParent(BlockId),
    #[error("container {id} has {count} payloads, exactly one is required")]
    PayloadCount { id: BlockId, count: usize },
    #[error("payload {0} interleaves field and container children")]
    InterleavedPayload(BlockId),
    #[error("generic container {0} has no id field")]
    MissingIdField(BlockId),
    #[error("{0} is not a valid child of its parent")]
    InvalidChild(BlockId),
    #[error("default nested container {0} is not described")]
    UnknownDefaultNested(BlockId),
}

/// Immutable description of one data format.
#[derive(Debug)]
pub struct FormatSpecification {
    format: String,
    descriptions: HashMap<BlockId, Rc<BlockDescription>>,
    top_level: Vec<BlockId>,
    generics: Vec<BlockId>,
    default_byte_order: ByteOrder,
    default_encoding: &'static Encoding,
    default_nested_container: Option<BlockId>,
}

fn rewrite(id: &BlockId, generic: &BlockId, concrete: &BlockId) -> BlockId {
    if id == generic || generic.is_ancestor_of(id) {
        let mut segments = concrete.segments().to_vec();
        segments.extend_from_slice(&id.segments()[generic.depth()..]);
        BlockId::from_segments(id.format(), segments)
    } else {
        id.clone()
    }
}

impl FormatSpecification {
    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn id(&self, global_id: &str) -> BlockId {
        BlockId::new(&self.format, global_id)
    }

    pub fn top_level_ids(&self) -> &[BlockId] {
        &self.top_level
    }

    pub fn default_byte_order(&self) -> ByteOrder {
        self.default_byte_order
    }

    pub fn default_encoding(&self) -> &'static Encoding {
        self.default_encoding
    }

    pub fn default_nested_container(&self) -> Option<&BlockId> {
        self.default_nested_container.as_ref()
    }

    pub fn is_described(&self, id: &BlockId) -> bool {
        self.descriptions.contains_key(id)
    }

    /// Exact description, or the description of the generic counterpart
    /// rewritten to carry the concrete ids. Field function targets keep
    /// pointing at the generic ids.
    pub fn description(&self, id: &BlockId) -> Option<Rc<BlockDescription>> {
        if let Some(desc) = self.descriptions.get(id) {
            return Some(desc.clone());
        }

        let generic_id = self.generic_id_of(id)?;
        let generic = self.descriptions.get(&generic_id)?;

        // Find the generic container that differs, everything below it follows
        let root = self
            .generics
            .iter()
            .filter(|g| **g == generic_id || g.is_ancestor_of(&generic_id))
            .max_by_key(|g| g.depth())?;
        let concrete_root = BlockId::from_segments(
            id.format(),
            id.segments()[..root.depth()].to_vec(),
        );

        let mut desc = (**generic).clone();
        desc.id = id.clone();
        desc.children = desc
            .children
            .iter()
            .map(|c| rewrite(c, root, &concrete_root))
            .collect();
        desc.id_field = desc
            .id_field
            .as_ref()
            .map(|c| rewrite(c, root, &concrete_root));

        Some(Rc::new(desc))
    }

    /// The generic id a concrete id is an instance of, if any.
    pub fn generic_id_of(&self, id: &BlockId) -> Option<BlockId> {
        for generic in &self.generics {
            let pos = generic.depth() - 1;
            if id.depth() <= pos
                || id.segments()[..pos] != generic.segments()[..pos]
                || id.segments()[pos] == generic.local_id()
            {
                continue;
            }

            let candidate = id.with_segment(pos, generic.local_id());
            if self.descriptions.contains_key(&candidate) {
                return Some(candidate);
            }
            if let Some(nested) = self.generic_id_of(&candidate) {
                return Some(nested);
            }
        }
        None
    }

    pub fn children_of(&self, id: &BlockId) -> Vec<Rc<BlockDescription>> {
        self.description(id)
            .map(|d| {
                d.children
                    .iter()
                    .filter_map(|c| self.description(c))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn payload_of(&self, container: &BlockId) -> Option<Rc<BlockDescription>> {
        self.children_of(container)
            .into_iter()
            .find(|d| d.physical_type.is_payload())
    }

    /// Size that is the same for every instance of the block.
    pub fn static_size_of(&self, id: &BlockId) -> Option<u64> {
        let desc = self.description(id)?;
        if let Some(size) = desc.fixed_size() {
            return Some(size);
        }
        if desc.children.is_empty() {
            return None;
        }

        let mut total = 0;
        for child in self.children_of(id) {
            if !child.has_fixed_occurrences() {
                return None;
            }
            total += self.static_size_of(&child.id)? * child.min_occurrences;
        }
        Some(total)
    }

    fn find_id_field(&self, id: &BlockId) -> Option<BlockId> {
        for child in self.children_of(id) {
            if child.function(FieldFunctionKind::IdOf).is_some() {
                return Some(child.id.clone());
            }
            if child.physical_type == PhysicalType::Container {
                continue;
            }
            if let Some(found) = self.find_id_field(&child.id) {
                return Some(found);
            }
        }
        None
    }
}

/// Flat builder, every block names its parent through its global id and is
/// attached to it in insertion order.
pub struct SpecificationBuilder {
    format: String,
    order: Vec<BlockId>,
    descriptions: HashMap<BlockId, BlockDescription>,
    default_byte_order: ByteOrder,
    default_encoding: &'static Encoding,
    default_nested_container: Option<BlockId>,
}

impl SpecificationBuilder {
    pub fn new(format: &str) -> Self {
        SpecificationBuilder {
            format: format.to_string(),
            order: Vec::new(),
            descriptions: HashMap::new(),
            default_byte_order: ByteOrder::BigEndian,
            default_encoding: encoding_rs::UTF_8,
            default_nested_container: None,
        }
    }

    pub fn default_byte_order(&mut self, order: ByteOrder) -> &mut Self {
        self.default_byte_order = order;
        self
    }

    pub fn default_encoding(&mut self, encoding: &'static Encoding) -> &mut Self {
        self.default_encoding = encoding;
        self
    }

    pub fn default_nested_container(&mut self, global_id: &str) -> &mut Self {
        self.default_nested_container = Some(BlockId::new(&self.format, global_id));
        self
    }

    pub fn block(&mut self, global_id: &str, physical_type: PhysicalType) -> &mut BlockDescription {
        let id = BlockId::new(&self.format, global_id);
        self.order.push(id.clone());

        // Duplicates are reported by build, keep the first
        self.descriptions
            .entry(id.clone())
            .or_insert_with(|| BlockDescription::new(id, physical_type))
    }

    pub fn container(&mut self, global_id: &str) -> &mut BlockDescription {
        self.block(global_id, PhysicalType::Container)
    }

    pub fn header(&mut self, global_id: &str) -> &mut BlockDescription {
        self.block(global_id, PhysicalType::Header)
    }

    pub fn footer(&mut self, global_id: &str) -> &mut BlockDescription {
        self.block(global_id, PhysicalType::Footer)
    }

    pub fn field_payload(&mut self, global_id: &str) -> &mut BlockDescription {
        self.block(global_id, PhysicalType::FieldBasedPayload)
    }

    pub fn container_payload(&mut self, global_id: &str) -> &mut BlockDescription {
        self.block(global_id, PhysicalType::ContainerBasedPayload)
    }

    pub fn field(&mut self, global_id: &str, field_type: FieldType) -> &mut BlockDescription {
        let desc = self.block(global_id, PhysicalType::Field);
        if let Some(props) = desc.field.as_mut() {
            props.field_type = field_type;
        }
        desc
    }

    pub fn build(self) -> Result<FormatSpecification, SpecificationError> {
        let SpecificationBuilder {
            format,
            order,
            mut descriptions,
            default_byte_order,
            default_encoding,
            default_nested_container,
        } = self;

        let mut top_level = Vec::new();
        let mut seen = Vec::with_capacity(order.len());
        for id in &order {
            if seen.contains(id) {
                return Err(SpecificationError::Duplicate(id.clone()));
            }
            seen.push(id.clone());

            let physical_type = descriptions[id].physical_type;
            let parent = id.parent().filter(|p| descriptions.contains_key(p));
            match parent {
                Some(parent) => {
                    let parent_type = descriptions[&parent].physical_type;
                    if !valid_child(parent_type, physical_type) {
                        return Err(SpecificationError::InvalidChild(id.clone()));
                    }
                    if let Some(p) = descriptions.get_mut(&parent) {
                        p.children.push(id.clone());
                    }
                }
                None if physical_type == PhysicalType::Container => top_level.push(id.clone()),
                None => return Err(SpecificationError::UnknownParent(id.clone())),
            }
        }

        for id in &order {
            let desc = &descriptions[id];
            if desc.physical_type == PhysicalType::Container {
                let count = desc
                    .children
                    .iter()
                    .filter(|c| descriptions[*c].physical_type.is_payload())
                    .count();
                if count != 1 {
                    return Err(SpecificationError::PayloadCount {
                        id: id.clone(),
                        count,
                    });
                }
            }

            if desc.physical_type == PhysicalType::ContainerBasedPayload {
                let transitions = desc
                    .children
                    .windows(2)
                    .filter(|w| {
                        descriptions[&w[0]].physical_type != descriptions[&w[1]].physical_type
                    })
                    .count();
                if transitions > 1 {
                    return Err(SpecificationError::InterleavedPayload(id.clone()));
                }
            }
        }

        if let Some(nested) = &default_nested_container {
            if !descriptions.contains_key(nested) {
                return Err(SpecificationError::UnknownDefaultNested(nested.clone()));
            }
        }

        let generics = order
            .iter()
            .filter(|id| descriptions[*id].generic)
            .cloned()
            .collect();

        compute_static_offsets(&order, &mut descriptions);

        let mut spec = FormatSpecification {
            format,
            descriptions: descriptions
                .into_iter()
                .map(|(id, d)| (id, Rc::new(d)))
                .collect(),
            top_level,
            generics,
            default_byte_order,
            default_encoding,
            default_nested_container,
        };

        // Id fields need the assembled tree
        let containers: Vec<BlockId> = order
            .iter()
            .filter(|id| spec.descriptions[*id].physical_type == PhysicalType::Container)
            .cloned()
            .collect();
        for id in containers {
            let id_field = spec.find_id_field(&id);
            let desc = &spec.descriptions[&id];
            if desc.generic && id_field.is_none() {
                return Err(SpecificationError::MissingIdField(id));
            }

            if id_field.is_some() {
                let mut desc = (**desc).clone();
                desc.id_field = id_field;
                spec.descriptions.insert(id, Rc::new(desc));
            }
        }

        Ok(spec)
    }
}

fn valid_child(parent: PhysicalType, child: PhysicalType) -> bool {
    use PhysicalType::*;

    match parent {
        Container => matches!(child, Header | Footer) || child.is_payload(),
        Header | Footer | FieldBasedPayload => child == Field,
        ContainerBasedPayload => matches!(child, Container | Field),
        Field => false,
    }
}

// Leading header fields with fixed size and a single occurrence sit at the
// same offset in every container instance.
fn compute_static_offsets(order: &[BlockId], descriptions: &mut HashMap<BlockId, BlockDescription>) {
    let containers: Vec<BlockId> = order
        .iter()
        .filter(|id| descriptions[*id].physical_type == PhysicalType::Container)
        .cloned()
        .collect();

    for container in containers {
        let mut offset = 0;
        let headers = descriptions[&container].children.clone();

        'headers: for header in headers {
            let header_desc = &descriptions[&header];
            if header_desc.physical_type != PhysicalType::Header
                || header_desc.min_occurrences != 1
                || header_desc.max_occurrences != 1
            {
                break;
            }

            for field in header_desc.children.clone() {
                let size = {
                    let f = &descriptions[&field];
                    if f.min_occurrences != 1 || f.max_occurrences != 1 {
                        None
                    } else {
                        f.fixed_size()
                    }
                };

                if let Some(f) = descriptions.get_mut(&field) {
                    f.byte_offset = Some(offset);
                }
                match size {
                    Some(size) => offset += size,
                    None => break 'headers,
                }
            }
        }
    }
}
