//! Container readers.
//!
//! One reader type serves both directions, [`ReadDirection`] picks how the
//! blocks of a container are walked. Field runs and payload contents are
//! always read front to back, so a backward reader hands payload contents to
//! a forward companion sharing its medium.
use std::cell::{OnceCell, RefCell};
use std::rc::Rc;

use log::{trace, warn};

use rcore::{
    BlockDescription, BlockId, FormatSpecification, MagicKey, MediumError, MediumStore,
    PhysicalType,
};

use crate::block::{BlockRef, Container, FieldSequence, Payload, PayloadChild, PayloadKind, SequenceKind};
use crate::config::ReaderConfig;
use crate::context::{ContainerContext, CountProvider, SizeProvider};
use crate::error::{BlockError, Result};
use crate::factory::BlockFactory;
use crate::field::Field;
use crate::iter::PayloadContainerIterator;
use crate::medium_data::MediumDataProvider;
use crate::termination::size_until_termination;

mod backward;
mod forward;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadDirection {
    Forward,
    Backward,
}

pub struct DataBlockReader {
    spec: Rc<FormatSpecification>,
    direction: ReadDirection,
    factory: BlockFactory,
    size_provider: Option<Rc<dyn SizeProvider>>,
    count_provider: Option<Rc<dyn CountProvider>>,
    forward: OnceCell<Rc<DataBlockReader>>,
}

impl DataBlockReader {
    pub fn new(
        spec: Rc<FormatSpecification>,
        medium: Rc<RefCell<dyn MediumStore>>,
        direction: ReadDirection,
        config: ReaderConfig,
    ) -> Self {
        let provider = MediumDataProvider::new(medium, config.max_single_read);

        DataBlockReader {
            spec,
            direction,
            factory: BlockFactory::new(provider, config),
            size_provider: None,
            count_provider: None,
            forward: OnceCell::new(),
        }
    }

    pub fn set_medium(&mut self, medium: Rc<RefCell<dyn MediumStore>>) {
        let config = self.factory.config().clone();
        let provider = MediumDataProvider::new(medium, config.max_single_read);
        self.factory = BlockFactory::new(provider, config);
        self.forward = OnceCell::new();
    }

    pub fn set_custom_size_provider(&mut self, provider: Option<Rc<dyn SizeProvider>>) {
        self.size_provider = provider;
        self.forward = OnceCell::new();
    }

    pub fn set_custom_count_provider(&mut self, provider: Option<Rc<dyn CountProvider>>) {
        self.count_provider = provider;
        self.forward = OnceCell::new();
    }

    pub fn specification(&self) -> &Rc<FormatSpecification> {
        &self.spec
    }

    pub fn direction(&self) -> ReadDirection {
        self.direction
    }

    pub fn provider(&self) -> &MediumDataProvider {
        self.factory.provider()
    }

    pub fn factory(&self) -> &BlockFactory {
        &self.factory
    }

    pub fn config(&self) -> &ReaderConfig {
        self.factory.config()
    }

    /// Reader for payload contents, the reader itself unless it reads backward.
    pub fn forward_reader(self: &Rc<Self>) -> Rc<DataBlockReader> {
        if self.direction == ReadDirection::Forward {
            return self.clone();
        }

        self.forward
            .get_or_init(|| {
                Rc::new(DataBlockReader {
                    spec: self.spec.clone(),
                    direction: ReadDirection::Forward,
                    factory: self.factory.clone(),
                    size_provider: self.size_provider.clone(),
                    count_provider: self.count_provider.clone(),
                    forward: OnceCell::new(),
                })
            })
            .clone()
    }

    pub fn new_context(&self, parent: Option<Rc<ContainerContext>>) -> Rc<ContainerContext> {
        Rc::new(ContainerContext::new(
            self.spec.clone(),
            parent,
            self.size_provider.clone(),
            self.count_provider.clone(),
        ))
    }

    fn describe(&self, id: &BlockId) -> Result<Rc<BlockDescription>> {
        self.spec
            .description(id)
            .ok_or_else(|| BlockError::InvalidSpecification(format!("{} is not described", id)))
    }

    fn buffer_hint(&self, offset: u64, remaining: Option<u64>) -> Result<()> {
        match self.direction {
            ReadDirection::Forward => self.provider().buffer_before_read(offset, remaining),
            ReadDirection::Backward => {
                let size = remaining
                    .unwrap_or(offset)
                    .min(offset)
                    .min(self.config().max_single_read);
                self.provider().buffer_before_read(offset - size, Some(size))
            }
        }
    }

    /// Probes the magic keys of `id`. Forward the container starts at
    /// `offset`, backward it ends there.
    pub fn has_container_with_id(
        &self,
        offset: u64,
        id: &BlockId,
        parent: Option<&BlockRef>,
        remaining: Option<u64>,
    ) -> Result<bool> {
        trace!(
            "Probing {} at {} in {:?}",
            id,
            offset,
            parent.map(|p| p.id.to_string())
        );
        self.buffer_hint(offset, remaining)?;

        if self.spec.default_nested_container() == Some(id) {
            return Ok(true);
        }

        let desc = match self.spec.description(id) {
            Some(desc) => desc,
            None => return Ok(false),
        };

        let probes: Vec<(u64, &MagicKey)> = match self.direction {
            ReadDirection::Forward => desc.header_magic_keys.iter().map(|k| (offset, k)).collect(),
            ReadDirection::Backward if !desc.footer_magic_keys.is_empty() => {
                desc.footer_magic_keys.iter().map(|k| (offset, k)).collect()
            }
            ReadDirection::Backward => match self.spec.static_size_of(id) {
                Some(size) if size <= offset => desc
                    .header_magic_keys
                    .iter()
                    .map(|k| (offset - size, k))
                    .collect(),
                _ => Vec::new(),
            },
        };

        for (base, key) in probes {
            match self.probe_key(id, base, key, offset, remaining) {
                Ok(true) => return Ok(true),
                Ok(false)
                | Err(BlockError::InsufficientBytes { .. })
                | Err(BlockError::Medium(MediumError::EndOfMedium { .. })) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }

    fn probe_key(
        &self,
        id: &BlockId,
        base: u64,
        key: &MagicKey,
        offset: u64,
        remaining: Option<u64>,
    ) -> Result<bool> {
        let len = key.byte_length();
        let insufficient = |needed: u64, remaining: u64| BlockError::InsufficientBytes {
            id: id.clone(),
            needed,
            remaining,
        };

        let at = base
            .checked_add_signed(key.delta_offset)
            .ok_or_else(|| insufficient(key.delta_offset.unsigned_abs(), base))?;

        // The key has to lie inside the bytes the parent still has
        match self.direction {
            ReadDirection::Forward => {
                if let Some(remaining) = remaining {
                    let end = (at + len).saturating_sub(offset);
                    if end > remaining {
                        return Err(insufficient(end, remaining));
                    }
                }
            }
            ReadDirection::Backward => {
                let lowest = offset - remaining.unwrap_or(offset).min(offset);
                if at < lowest {
                    return Err(insufficient(offset - at, offset - lowest));
                }
            }
        }

        let data = self.provider().get_data(at, len)?;
        Ok(key.matches(&data))
    }

    /// Whether any top level container of the format sits at `offset`.
    pub fn identifies_data_format(&self, offset: u64) -> Result<bool> {
        let remaining = self.top_level_remaining(offset);
        for id in self.spec.top_level_ids() {
            if self.has_container_with_id(offset, id, None, remaining)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub(crate) fn top_level_remaining(&self, offset: u64) -> Option<u64> {
        match self.direction {
            ReadDirection::Forward => None,
            ReadDirection::Backward => Some(offset),
        }
    }

    /// Reads one container. Forward `offset` is its first byte, backward it
    /// is the position right after its last byte.
    #[allow(clippy::too_many_arguments)]
    pub fn read_container_with_id(
        self: &Rc<Self>,
        offset: u64,
        id: &BlockId,
        parent: Option<&BlockRef>,
        remaining: Option<u64>,
        parent_context: Option<Rc<ContainerContext>>,
        sequence_number: usize,
    ) -> Result<Container> {
        match self.direction {
            ReadDirection::Forward => self.read_container_forward(
                offset,
                id,
                parent,
                remaining,
                parent_context,
                sequence_number,
            ),
            ReadDirection::Backward => self.read_container_backward(
                offset,
                id,
                parent,
                remaining,
                parent_context,
                sequence_number,
            ),
        }
    }

    /// Reads all field children of `parent_id` from `offset` on. Bytes of a
    /// known `remaining` that no child accounts for end up in one trailing
    /// unknown field.
    pub fn read_fields(
        &self,
        offset: u64,
        parent_id: &BlockId,
        parent: &BlockRef,
        remaining: Option<u64>,
        context: &ContainerContext,
    ) -> Result<Vec<Rc<Field>>> {
        let children: Vec<Rc<BlockDescription>> = self
            .spec
            .children_of(parent_id)
            .into_iter()
            .filter(|c| c.physical_type == PhysicalType::Field)
            .collect();

        let (fields, _) = self.read_field_run(&children, offset, parent, remaining, context, true)?;
        Ok(fields)
    }

    fn read_field_run(
        &self,
        children: &[Rc<BlockDescription>],
        offset: u64,
        parent: &BlockRef,
        mut remaining: Option<u64>,
        context: &ContainerContext,
        fill: bool,
    ) -> Result<(Vec<Rc<Field>>, u64)> {
        let mut fields = Vec::new();
        let mut cursor = offset;

        for desc in children {
            let count = context
                .get_occurrences_of(&desc.id)?
                .unwrap_or(desc.min_occurrences);

            for i in 0..count as usize {
                let size = self.field_size(desc, i, cursor, remaining, context)?;
                trace!("Reading field {}[{}] at {} ({} bytes)", desc.id, i, cursor, size);

                let field = self
                    .factory
                    .create_field_from_medium(desc.clone(), i, parent, cursor, size, context)?;
                context.add_field_functions(&field);

                cursor += size;
                remaining = consume(&desc.id, remaining, size)?;
                fields.push(field);
            }
        }

        if fill {
            if let Some(rest) = remaining.filter(|r| *r > 0) {
                trace!("{} unknown bytes at {} in {}", rest, cursor, parent.id);
                fields.push(self.factory.create_unknown_field(&self.spec, parent, cursor, rest)?);
                cursor += rest;
            }
        }

        Ok((fields, cursor - offset))
    }

    // Context first, then the terminator, then whatever the parent has left
    fn field_size(
        &self,
        desc: &BlockDescription,
        sequence_number: usize,
        offset: u64,
        remaining: Option<u64>,
        context: &ContainerContext,
    ) -> Result<u64> {
        let terminator = desc.field.as_ref().and_then(|f| f.termination_character);

        let size = match context.get_size_of(&desc.id, sequence_number)? {
            Some(size) => size,
            None => match terminator {
                Some(terminator) => {
                    let encoding = context
                        .get_character_encoding_of(&desc.id, sequence_number)?
                        .ok_or_else(|| BlockError::BinaryConversion {
                            id: desc.id.clone(),
                            reason: "character encoding of the terminator is unknown".into(),
                        })?;
                    let mut supplier = self.provider().field_supplier(offset, remaining);

                    size_until_termination(
                        encoding,
                        terminator,
                        &mut supplier,
                        remaining,
                        self.config().termination_block_size,
                    )?
                }
                None => remaining.ok_or_else(|| BlockError::UndeterminedSize(desc.id.clone()))?,
            },
        };

        match remaining {
            Some(remaining) if size > remaining => Err(BlockError::InsufficientBytes {
                id: desc.id.clone(),
                needed: size,
                remaining,
            }),
            _ => Ok(size),
        }
    }

    /// Reads every occurrence of a header or footer. Forward they start at
    /// `offset`, backward the last one ends there.
    pub fn read_headers_or_footers_with_id(
        &self,
        offset: u64,
        id: &BlockId,
        parent: &BlockRef,
        mut remaining: Option<u64>,
        context: &ContainerContext,
    ) -> Result<Vec<FieldSequence>> {
        let desc = self.describe(id)?;
        let kind = match desc.physical_type {
            PhysicalType::Header => SequenceKind::Header,
            PhysicalType::Footer => SequenceKind::Footer,
            _ => {
                return Err(BlockError::InvalidSpecification(format!(
                    "{} is neither a header nor a footer",
                    id
                )))
            }
        };
        let count = context.get_occurrences_of(id)?.unwrap_or(desc.min_occurrences) as usize;

        let mut sequences = Vec::new();
        let mut cursor = offset;
        match self.direction {
            ReadDirection::Forward => {
                for i in 0..count {
                    let size = context.get_size_of(id, i)?;
                    let me = BlockRef::new(id.clone(), i);
                    let fields = self.read_fields(cursor, id, &me, size, context)?;

                    let sequence = self.create_sequence(kind, id, cursor, i, parent, fields);
                    let total = sequence
                        .total_size()
                        .ok_or_else(|| BlockError::UndeterminedSize(id.clone()))?;

                    cursor += total;
                    remaining = consume(id, remaining, total)?;
                    sequences.push(sequence);
                }
            }
            ReadDirection::Backward => {
                for i in (0..count).rev() {
                    let size = context
                        .get_size_of(id, i)?
                        .or_else(|| self.spec.static_size_of(id))
                        .ok_or_else(|| {
                            BlockError::InvalidSpecification(format!(
                                "size of {} is unknown, it cannot be read backward",
                                id
                            ))
                        })?;
                    cursor = step_back(id, cursor, size, remaining)?;
                    remaining = consume(id, remaining, size)?;

                    let me = BlockRef::new(id.clone(), i);
                    let fields = self.read_fields(cursor, id, &me, Some(size), context)?;
                    sequences.push(self.create_sequence(kind, id, cursor, i, parent, fields));
                }
                sequences.reverse();
            }
        }

        Ok(sequences)
    }

    fn create_sequence(
        &self,
        kind: SequenceKind,
        id: &BlockId,
        offset: u64,
        sequence_number: usize,
        parent: &BlockRef,
        fields: Vec<Rc<Field>>,
    ) -> FieldSequence {
        match kind {
            SequenceKind::Header => {
                self.factory
                    .create_header(id.clone(), offset, sequence_number, parent, fields)
            }
            SequenceKind::Footer => {
                self.factory
                    .create_footer(id.clone(), offset, sequence_number, parent, fields)
            }
        }
    }

    /// Reads the payload `id`. Forward it starts at `offset`, backward it
    /// ends there.
    pub fn read_payload(
        self: &Rc<Self>,
        offset: u64,
        id: &BlockId,
        parent: &BlockRef,
        remaining: Option<u64>,
        context: &Rc<ContainerContext>,
    ) -> Result<Payload> {
        match self.direction {
            ReadDirection::Forward => self.read_payload_forward(offset, id, parent, remaining, context),
            ReadDirection::Backward => {
                self.read_payload_backward(offset, id, parent, remaining, context)
            }
        }
    }

    /// Reads the children of a payload starting at `offset`, always front
    /// to back.
    pub(crate) fn read_payload_children(
        self: &Rc<Self>,
        id: &BlockId,
        kind: PayloadKind,
        offset: u64,
        size: Option<u64>,
        payload: &BlockRef,
        context: &Rc<ContainerContext>,
    ) -> Result<Vec<PayloadChild>> {
        if self.direction == ReadDirection::Backward {
            return self
                .forward_reader()
                .read_payload_children(id, kind, offset, size, payload, context);
        }

        match kind {
            PayloadKind::FieldBased => Ok(self
                .read_fields(offset, id, payload, size, context)?
                .into_iter()
                .map(PayloadChild::Field)
                .collect()),
            PayloadKind::ContainerBased => {
                self.read_container_children(id, offset, size, payload, context)
            }
        }
    }

    // A leading run of fields, the child containers, then a trailing run
    fn read_container_children(
        self: &Rc<Self>,
        id: &BlockId,
        offset: u64,
        mut remaining: Option<u64>,
        payload: &BlockRef,
        context: &Rc<ContainerContext>,
    ) -> Result<Vec<PayloadChild>> {
        let descs = self.spec.children_of(id);
        fn is_field(desc: &BlockDescription) -> bool {
            desc.physical_type == PhysicalType::Field
        }

        let leading: Vec<_> = descs.iter().take_while(|d| is_field(d)).cloned().collect();
        let trailing: Vec<_> = descs
            .iter()
            .skip(leading.len())
            .skip_while(|d| !is_field(d))
            .cloned()
            .collect();

        let mut children = Vec::new();
        let mut cursor = offset;

        if !leading.is_empty() {
            let (fields, size) =
                self.read_field_run(&leading, cursor, payload, remaining, context, false)?;
            cursor += size;
            remaining = consume(id, remaining, size)?;
            children.extend(fields.into_iter().map(PayloadChild::Field));
        }

        let mut containers = PayloadContainerIterator::new(
            self.clone(),
            payload.clone(),
            cursor,
            remaining,
            context.clone(),
        );
        while containers.has_next()? {
            match containers.read_next()? {
                Some(container) => children.push(PayloadChild::Container(Rc::new(container))),
                None if !trailing.is_empty() => break,
                None => return Err(BlockError::NoChildContainer(id.clone())),
            }
        }
        cursor = containers.offset();
        remaining = containers.remaining();

        if !trailing.is_empty() {
            let (fields, _) =
                self.read_field_run(&trailing, cursor, payload, remaining, context, true)?;
            children.extend(fields.into_iter().map(PayloadChild::Field));
        }

        Ok(children)
    }

    /// Concrete id of the container `id` starting at `offset`. Generic
    /// containers take it from their id field, when that field cannot be
    /// interpreted the generic id is kept.
    pub fn determine_actual_container_id(
        &self,
        offset: u64,
        id: &BlockId,
        remaining: Option<u64>,
        context: &ContainerContext,
    ) -> Result<BlockId> {
        let desc = self.describe(id)?;
        if !desc.generic {
            return Ok(id.clone());
        }

        let field_id = desc.id_field.as_ref().ok_or_else(|| {
            BlockError::InvalidSpecification(format!("generic container {} has no id field", id))
        })?;
        let field_desc = self.describe(field_id)?;
        let field_offset = field_desc.byte_offset.ok_or_else(|| {
            BlockError::InvalidSpecification(format!(
                "offset of id field {} is not static",
                field_id
            ))
        })?;

        let at = offset + field_offset;
        let remaining = remaining.map(|r| r.saturating_sub(field_offset));
        let size = self.field_size(&field_desc, 0, at, remaining, context)?;
        let field = self.factory.create_field_from_medium(
            field_desc,
            0,
            &BlockRef::new(id.clone(), 0),
            at,
            size,
            context,
        )?;

        match field.interpreted_value() {
            Ok(value) => {
                let concrete = id.with_local_id(&value.to_string());
                trace!("Generic {} at {} is {}", id, offset, concrete);
                Ok(concrete)
            }
            Err(e) => {
                warn!("Keeping generic id {} at {}: {}", id, offset, e);
                Ok(id.clone())
            }
        }
    }

    // Bytes the footers of `container` take at least
    fn static_footer_size(&self, container: &BlockId) -> u64 {
        self.spec
            .children_of(container)
            .iter()
            .filter(|c| c.physical_type == PhysicalType::Footer)
            .map(|c| self.spec.static_size_of(&c.id).unwrap_or(0) * c.min_occurrences)
            .sum()
    }
}

fn payload_kind(desc: &BlockDescription) -> Result<PayloadKind> {
    match desc.physical_type {
        PhysicalType::FieldBasedPayload => Ok(PayloadKind::FieldBased),
        PhysicalType::ContainerBasedPayload => Ok(PayloadKind::ContainerBased),
        _ => Err(BlockError::InvalidSpecification(format!(
            "{} is not a payload",
            desc.id
        ))),
    }
}

fn consume(id: &BlockId, remaining: Option<u64>, size: u64) -> Result<Option<u64>> {
    match remaining {
        None => Ok(None),
        Some(r) => r
            .checked_sub(size)
            .map(Some)
            .ok_or_else(|| BlockError::InsufficientBytes {
                id: id.clone(),
                needed: size,
                remaining: r,
            }),
    }
}

fn step_back(id: &BlockId, offset: u64, size: u64, remaining: Option<u64>) -> Result<u64> {
    let available = remaining.unwrap_or(offset).min(offset);
    if size > available {
        return Err(BlockError::InsufficientBytes {
            id: id.clone(),
            needed: size,
            remaining: available,
        });
    }
    Ok(offset - size)
}
