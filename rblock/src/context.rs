//! Per container store of field function cross references.
//!
//! While the fields of a container are read, every field carrying a field
//! function is registered under the ids it targets. Later reads ask the
//! context for sizes, counts, byte orders and character encodings, and the
//! context answers from those references, from the specification, or by
//! asking the context of the enclosing container.
use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use encoding_rs::Encoding;
use log::warn;

use rcore::{BlockId, ByteOrder, FieldFunction, FieldFunctionKind, FormatSpecification};

use crate::block::BlockRef;
use crate::error::{BlockError, Result};
use crate::field::Field;

/// Caller supplied sizes, consulted before anything else.
pub trait SizeProvider {
    fn size_of(&self, id: &BlockId, sequence_number: usize, context: &ContainerContext) -> Option<u64>;
}

/// Caller supplied occurrence counts, consulted before anything else.
pub trait CountProvider {
    fn count_of(&self, id: &BlockId, context: &ContainerContext) -> Option<u64>;
}

#[derive(Debug, Clone)]
pub struct CrossReference {
    pub field: Rc<Field>,
    pub function: FieldFunction,
}

type References = HashMap<FieldFunctionKind, HashMap<BlockId, HashMap<usize, CrossReference>>>;

pub struct ContainerContext {
    spec: Rc<FormatSpecification>,
    parent: Option<Rc<ContainerContext>>,
    container: OnceCell<BlockRef>,
    size_provider: Option<Rc<dyn SizeProvider>>,
    count_provider: Option<Rc<dyn CountProvider>>,
    references: RefCell<References>,
}

impl ContainerContext {
    pub fn new(
        spec: Rc<FormatSpecification>,
        parent: Option<Rc<ContainerContext>>,
        size_provider: Option<Rc<dyn SizeProvider>>,
        count_provider: Option<Rc<dyn CountProvider>>,
    ) -> Self {
        ContainerContext {
            spec,
            parent,
            container: OnceCell::new(),
            size_provider,
            count_provider,
            references: RefCell::new(HashMap::new()),
        }
    }

    pub fn specification(&self) -> &FormatSpecification {
        &self.spec
    }

    pub fn parent(&self) -> Option<&Rc<ContainerContext>> {
        self.parent.as_ref()
    }

    /// Binds the context to its container, only allowed once.
    pub fn init_container(&self, container: BlockRef) -> Result<()> {
        let id = container.id.clone();
        self.container
            .set(container)
            .map_err(|_| BlockError::ContextInitialized(id))
    }

    pub fn container(&self) -> Option<&BlockRef> {
        self.container.get()
    }

    /// Registers every field function of `field` under its targets. Existing
    /// references are never replaced.
    pub fn add_field_functions(&self, field: &Rc<Field>) {
        let functions = match field.description().field.as_ref() {
            Some(props) => &props.functions,
            None => return,
        };

        let mut references = self.references.borrow_mut();
        for function in functions {
            let by_target = references.entry(function.kind()).or_default();

            for target in function.targets() {
                by_target
                    .entry(target.clone())
                    .or_default()
                    .entry(field.sequence_number())
                    .or_insert_with(|| CrossReference {
                        field: field.clone(),
                        function: function.clone(),
                    });
            }
        }
    }

    pub fn cross_reference(
        &self,
        kind: FieldFunctionKind,
        id: &BlockId,
        sequence_number: usize,
    ) -> Option<CrossReference> {
        self.references
            .borrow()
            .get(&kind)
            .and_then(|t| t.get(id))
            .and_then(|s| s.get(&sequence_number))
            .cloned()
    }

    // Direct reference, or one registered under the generic counterpart
    fn aliased_reference(
        &self,
        kind: FieldFunctionKind,
        id: &BlockId,
        sequence_number: usize,
    ) -> Option<CrossReference> {
        self.cross_reference(kind, id, sequence_number).or_else(|| {
            self.spec
                .generic_id_of(id)
                .and_then(|g| self.cross_reference(kind, &g, sequence_number))
        })
    }

    fn numeric_value(reference: &CrossReference) -> Result<Option<u64>> {
        Ok(reference.field.interpreted_value()?.as_u64())
    }

    pub fn get_size_of(&self, id: &BlockId, sequence_number: usize) -> Result<Option<u64>> {
        self.size_of(id, sequence_number, true)
    }

    fn size_of(&self, id: &BlockId, sequence_number: usize, summed: bool) -> Result<Option<u64>> {
        if let Some(provider) = &self.size_provider {
            if let Some(size) = provider.size_of(id, sequence_number, self) {
                return Ok(Some(size));
            }
        }

        if let Some(size) = self.spec.description(id).and_then(|d| d.fixed_size()) {
            return Ok(Some(size));
        }

        if let Some(reference) = self.cross_reference(FieldFunctionKind::SizeOf, id, sequence_number) {
            return Self::numeric_value(&reference);
        }

        if summed {
            if let Some(reference) =
                self.cross_reference(FieldFunctionKind::SummedSizeOf, id, sequence_number)
            {
                return self.size_from_sum(id, &reference);
            }
        }

        if let Some(generic) = self.spec.generic_id_of(id) {
            return self.size_of(&generic, sequence_number, summed);
        }

        match &self.parent {
            Some(parent) => parent.size_of(id, sequence_number, summed),
            None => Ok(None),
        }
    }

    // The summed value minus every sibling target, the siblings must be known
    fn size_from_sum(&self, id: &BlockId, reference: &CrossReference) -> Result<Option<u64>> {
        let mut remaining = match Self::numeric_value(reference)? {
            Some(x) => x,
            None => return Ok(None),
        };

        for sibling in reference.function.targets() {
            if sibling == id {
                continue;
            }

            let occurrences = self.get_occurrences_of(sibling)?.unwrap_or(0);
            for i in 0..occurrences as usize {
                let size = match self.size_of(sibling, i, false)? {
                    Some(x) => x,
                    None => return Ok(None),
                };
                remaining = match remaining.checked_sub(size) {
                    Some(x) => x,
                    None => return Ok(None),
                };
            }
        }

        Ok(Some(remaining))
    }

    pub fn get_occurrences_of(&self, id: &BlockId) -> Result<Option<u64>> {
        if let Some(provider) = &self.count_provider {
            if let Some(count) = provider.count_of(id, self) {
                return Ok(Some(count));
            }
        }

        if let Some(desc) = self.spec.description(id) {
            if desc.has_fixed_occurrences() {
                return Ok(Some(desc.max_occurrences));
            }

            if desc.is_optional() {
                if let Some(reference) = self.cross_reference(FieldFunctionKind::PresenceOf, id, 0) {
                    return Self::presence(&reference).map(Some);
                }
            }
        }

        if let Some(reference) = self.cross_reference(FieldFunctionKind::CountOf, id, 0) {
            return Self::numeric_value(&reference);
        }

        if let Some(generic) = self.spec.generic_id_of(id) {
            return self.get_occurrences_of(&generic);
        }

        match &self.parent {
            Some(parent) => parent.get_occurrences_of(id),
            None => Ok(None),
        }
    }

    fn presence(reference: &CrossReference) -> Result<u64> {
        let (flag_name, flag_value) = match &reference.function {
            FieldFunction::PresenceOf {
                flag_name,
                flag_value,
                ..
            } => (flag_name, *flag_value),
            _ => return Ok(0),
        };

        let value = reference.field.interpreted_value()?;
        let present = value
            .as_flags()
            .and_then(|f| f.flag_value(flag_name))
            .map(|v| v == flag_value)
            .unwrap_or(false);

        Ok(present as u64)
    }

    fn label_of(&self, kind: FieldFunctionKind, id: &BlockId, sequence_number: usize) -> Result<Option<String>> {
        let reference = self.aliased_reference(kind, id, sequence_number).or_else(|| {
            let mut current = id.parent();
            while let Some(ancestor) = current {
                if let Some(r) = self.aliased_reference(kind, &ancestor, 0) {
                    return Some(r);
                }
                current = ancestor.parent();
            }
            None
        });

        match reference {
            Some(r) => Ok(Some(r.field.interpreted_value()?.to_string())),
            None => Ok(None),
        }
    }

    /// Byte order of a block. `None` means a referencing field holds a value
    /// that is no byte order.
    pub fn get_byte_order_of(&self, id: &BlockId, sequence_number: usize) -> Result<Option<ByteOrder>> {
        let fixed = self
            .spec
            .description(id)
            .and_then(|d| d.field.as_ref().and_then(|f| f.byte_order));
        if let Some(order) = fixed {
            return Ok(Some(order));
        }

        if let Some(label) = self.label_of(FieldFunctionKind::ByteOrderOf, id, sequence_number)? {
            return match label.parse::<ByteOrder>() {
                Ok(order) => Ok(Some(order)),
                Err(e) => {
                    warn!("Byte order of {} is unusable: {}", id, e);
                    Ok(None)
                }
            };
        }

        match &self.parent {
            Some(parent) => parent.get_byte_order_of(id, sequence_number),
            None => Ok(Some(self.spec.default_byte_order())),
        }
    }

    /// Character encoding of a block. `None` means a referencing field holds
    /// a label that names no known encoding.
    pub fn get_character_encoding_of(
        &self,
        id: &BlockId,
        sequence_number: usize,
    ) -> Result<Option<&'static Encoding>> {
        let fixed = self
            .spec
            .description(id)
            .and_then(|d| d.field.as_ref().and_then(|f| f.character_encoding));
        if let Some(encoding) = fixed {
            return Ok(Some(encoding));
        }

        if let Some(label) =
            self.label_of(FieldFunctionKind::CharacterEncodingOf, id, sequence_number)?
        {
            return match Encoding::for_label(label.trim().as_bytes()) {
                Some(encoding) => Ok(Some(encoding)),
                None => {
                    warn!("Character encoding {:?} of {} is unknown", label, id);
                    Ok(None)
                }
            };
        }

        match &self.parent {
            Some(parent) => parent.get_character_encoding_of(id, sequence_number),
            None => Ok(Some(self.spec.default_encoding())),
        }
    }
}

#[cfg(test)]
mod test_context {
    use super::*;
    use crate::block::BlockRef;
    use rcore::{
        BitAddress, FieldType, FlagDescription, FlagSpecification, Flags, Interpreted,
        SpecificationBuilder,
    };

    fn test_spec() -> Rc<FormatSpecification> {
        let mut b = SpecificationBuilder::new("t");
        b.container("t");
        b.header("t.header");
        b.field("t.header.size", FieldType::UnsignedNumeric)
            .fixed(1)
            .add_function(FieldFunction::SizeOf(vec![BlockId::new("t", "t.payload")]));
        b.field("t.header.count", FieldType::UnsignedNumeric)
            .fixed(1)
            .add_function(FieldFunction::CountOf(vec![BlockId::new("t", "t.payload.item")]));
        b.field("t.header.sum", FieldType::UnsignedNumeric)
            .fixed(1)
            .add_function(FieldFunction::SummedSizeOf(vec![
                BlockId::new("t", "t.footer"),
                BlockId::new("t", "t.footer2"),
            ]));
        b.field("t.header.order", FieldType::String)
            .fixed(2)
            .add_function(FieldFunction::ByteOrderOf(vec![BlockId::new("t", "t.payload")]));
        b.field("t.header.flags", FieldType::Flags)
            .fixed(1)
            .flags(FlagSpecification::new(
                vec![FlagDescription {
                    name: "extended".into(),
                    start: BitAddress::new(0, 0),
                    bit_size: 1,
                }],
                1,
                vec![],
            ))
            .add_function(FieldFunction::PresenceOf {
                targets: vec![BlockId::new("t", "t.payload.extra")],
                flag_name: "extended".into(),
                flag_value: 1,
            });
        b.field_payload("t.payload");
        b.field("t.payload.item", FieldType::Binary)
            .fixed(2)
            .occurrences(0, 10);
        b.field("t.payload.extra", FieldType::Binary)
            .fixed(1)
            .occurrences(0, 1);
        b.footer("t.footer");
        b.footer("t.footer2").fixed(3);
        Rc::new(b.build().unwrap())
    }

    fn field(spec: &FormatSpecification, id: &str, value: Interpreted) -> Rc<Field> {
        let desc = spec.description(&spec.id(id)).unwrap();
        Rc::new(Field::from_interpreted(
            desc,
            0,
            None,
            value,
            Some(ByteOrder::BigEndian),
            Some(encoding_rs::UTF_8),
        ))
    }

    fn flags(spec: &FormatSpecification, set: bool) -> Interpreted {
        let desc = spec.description(&spec.id("t.header.flags")).unwrap();
        let flag_spec = desc
            .field
            .as_ref()
            .and_then(|f| f.flag_specification.clone())
            .unwrap();
        let mut flags = Flags::new(flag_spec);
        flags.set_flag("extended", set);
        Interpreted::Flags(flags)
    }

    #[test]
    fn empty_context_is_undefined() {
        let spec = test_spec();
        let parent = Rc::new(ContainerContext::new(spec.clone(), None, None, None));
        let ctx = ContainerContext::new(spec.clone(), Some(parent), None, None);

        assert_eq!(ctx.get_size_of(&spec.id("t.payload"), 0).unwrap(), None);
        assert_eq!(ctx.get_occurrences_of(&spec.id("t.payload.item")).unwrap(), None);
    }

    #[test]
    fn fixed_wins() {
        let spec = test_spec();
        let ctx = ContainerContext::new(spec.clone(), None, None, None);

        assert_eq!(ctx.get_size_of(&spec.id("t.header.size"), 0).unwrap(), Some(1));
        assert_eq!(ctx.get_occurrences_of(&spec.id("t.header")).unwrap(), Some(1));
    }

    #[test]
    fn size_and_count_references() {
        let spec = test_spec();
        let ctx = ContainerContext::new(spec.clone(), None, None, None);

        ctx.add_field_functions(&field(&spec, "t.header.size", Interpreted::Unsigned(12)));
        ctx.add_field_functions(&field(&spec, "t.header.count", Interpreted::Unsigned(6)));

        assert_eq!(ctx.get_size_of(&spec.id("t.payload"), 0).unwrap(), Some(12));
        assert_eq!(ctx.get_size_of(&spec.id("t.payload"), 1).unwrap(), None);
        assert_eq!(ctx.get_occurrences_of(&spec.id("t.payload.item")).unwrap(), Some(6));
    }

    #[test]
    fn references_are_not_replaced() {
        let spec = test_spec();
        let ctx = ContainerContext::new(spec.clone(), None, None, None);

        ctx.add_field_functions(&field(&spec, "t.header.size", Interpreted::Unsigned(12)));
        ctx.add_field_functions(&field(&spec, "t.header.size", Interpreted::Unsigned(99)));

        assert_eq!(ctx.get_size_of(&spec.id("t.payload"), 0).unwrap(), Some(12));
        assert_eq!(ctx.get_size_of(&spec.id("t.payload"), 0).unwrap(), Some(12));
    }

    #[test]
    fn summed_size_minus_siblings() {
        let spec = test_spec();
        let ctx = ContainerContext::new(spec.clone(), None, None, None);

        ctx.add_field_functions(&field(&spec, "t.header.sum", Interpreted::Unsigned(10)));
        assert_eq!(ctx.get_size_of(&spec.id("t.footer"), 0).unwrap(), Some(7));
    }

    #[test]
    fn summed_size_never_negative() {
        let spec = test_spec();
        let ctx = ContainerContext::new(spec.clone(), None, None, None);

        ctx.add_field_functions(&field(&spec, "t.header.sum", Interpreted::Unsigned(2)));
        assert_eq!(ctx.get_size_of(&spec.id("t.footer"), 0).unwrap(), None);
    }

    #[test]
    fn presence_from_flags() {
        let spec = test_spec();
        let extra = spec.id("t.payload.extra");

        let ctx = ContainerContext::new(spec.clone(), None, None, None);
        ctx.add_field_functions(&field(&spec, "t.header.flags", flags(&spec, true)));
        assert_eq!(ctx.get_occurrences_of(&extra).unwrap(), Some(1));

        let ctx = ContainerContext::new(spec.clone(), None, None, None);
        ctx.add_field_functions(&field(&spec, "t.header.flags", flags(&spec, false)));
        assert_eq!(ctx.get_occurrences_of(&extra).unwrap(), Some(0));
    }

    #[test]
    fn byte_order_chain() {
        let spec = test_spec();
        let parent = Rc::new(ContainerContext::new(spec.clone(), None, None, None));
        let ctx = ContainerContext::new(spec.clone(), Some(parent.clone()), None, None);
        let item = spec.id("t.payload.item");

        // Default of the specification at the end of the chain
        assert_eq!(ctx.get_byte_order_of(&item, 0).unwrap(), Some(ByteOrder::BigEndian));

        // Reference on an ancestor of the block, in the parent context
        parent.add_field_functions(&field(&spec, "t.header.order", Interpreted::String("LE".into())));
        assert_eq!(ctx.get_byte_order_of(&item, 0).unwrap(), Some(ByteOrder::LittleEndian));
    }

    #[test]
    fn unusable_byte_order() {
        let spec = test_spec();
        let ctx = ContainerContext::new(spec.clone(), None, None, None);

        ctx.add_field_functions(&field(&spec, "t.header.order", Interpreted::String("XX".into())));
        assert_eq!(ctx.get_byte_order_of(&spec.id("t.payload"), 0).unwrap(), None);
    }

    struct Fixed(u64);

    impl SizeProvider for Fixed {
        fn size_of(&self, _: &BlockId, _: usize, _: &ContainerContext) -> Option<u64> {
            Some(self.0)
        }
    }

    impl CountProvider for Fixed {
        fn count_of(&self, _: &BlockId, _: &ContainerContext) -> Option<u64> {
            Some(self.0)
        }
    }

    #[test]
    fn custom_providers_first() {
        let spec = test_spec();
        let ctx = ContainerContext::new(
            spec.clone(),
            None,
            Some(Rc::new(Fixed(42))),
            Some(Rc::new(Fixed(3))),
        );

        assert_eq!(ctx.get_size_of(&spec.id("t.header.size"), 0).unwrap(), Some(42));
        assert_eq!(ctx.get_occurrences_of(&spec.id("t.header")).unwrap(), Some(3));
    }

    #[test]
    fn init_once() {
        let spec = test_spec();
        let ctx = ContainerContext::new(spec.clone(), None, None, None);
        let me = BlockRef::new(spec.id("t"), 0);

        assert!(ctx.init_container(me.clone()).is_ok());
        assert!(matches!(
            ctx.init_container(me),
            Err(BlockError::ContextInitialized(_))
        ));
        assert_eq!(ctx.container().unwrap().id, spec.id("t"));
    }
}
