use std::rc::Rc;

use rcore::{BlockDescription, BlockId, FieldType, FormatSpecification, Interpreted, PhysicalType};

use crate::block::{
    BlockRef, Container, FieldSequence, Footer, Header, Payload, PayloadChild, PayloadKind,
    PayloadSource, SequenceKind,
};
use crate::config::ReaderConfig;
use crate::context::ContainerContext;
use crate::error::Result;
use crate::field::Field;
use crate::medium_data::MediumDataProvider;

pub const UNKNOWN_FIELD_ID: &str = "unknown";

/// Assembles blocks and wires them to their parents. All medium access of
/// the created fields goes through the one provider held here.
#[derive(Clone)]
pub struct BlockFactory {
    provider: MediumDataProvider,
    config: ReaderConfig,
}

impl BlockFactory {
    pub fn new(provider: MediumDataProvider, config: ReaderConfig) -> Self {
        BlockFactory { provider, config }
    }

    pub fn provider(&self) -> &MediumDataProvider {
        &self.provider
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Field read from the medium, its byte order and character encoding
    /// come from the context.
    pub fn create_field_from_medium(
        &self,
        desc: Rc<BlockDescription>,
        sequence_number: usize,
        parent: &BlockRef,
        offset: u64,
        size: u64,
        context: &ContainerContext,
    ) -> Result<Rc<Field>> {
        let byte_order = context.get_byte_order_of(&desc.id, sequence_number)?;
        let encoding = context.get_character_encoding_of(&desc.id, sequence_number)?;

        let field = Field::from_medium(
            desc,
            sequence_number,
            Some(parent.clone()),
            offset,
            size,
            &self.provider,
            byte_order,
            encoding,
            self.config.lazy_field_threshold,
        )?;
        Ok(Rc::new(field))
    }

    /// Binary field covering bytes of a parent that no description accounts for.
    pub fn create_unknown_field(
        &self,
        spec: &FormatSpecification,
        parent: &BlockRef,
        offset: u64,
        size: u64,
    ) -> Result<Rc<Field>> {
        let mut desc = BlockDescription::new(parent.id.child(UNKNOWN_FIELD_ID), PhysicalType::Field);
        desc.fixed(size);

        let field = Field::from_medium(
            Rc::new(desc),
            0,
            Some(parent.clone()),
            offset,
            size,
            &self.provider,
            Some(spec.default_byte_order()),
            Some(spec.default_encoding()),
            self.config.lazy_field_threshold,
        )?;
        Ok(Rc::new(field))
    }

    pub fn create_field_from_interpreted(
        &self,
        desc: Rc<BlockDescription>,
        sequence_number: usize,
        parent: Option<&BlockRef>,
        value: Interpreted,
        context: &ContainerContext,
    ) -> Result<Rc<Field>> {
        let byte_order = context.get_byte_order_of(&desc.id, sequence_number)?;
        let encoding = context.get_character_encoding_of(&desc.id, sequence_number)?;

        Ok(Rc::new(Field::from_interpreted(
            desc,
            sequence_number,
            parent.cloned(),
            value,
            byte_order,
            encoding,
        )))
    }

    pub fn create_header(
        &self,
        id: BlockId,
        offset: u64,
        sequence_number: usize,
        parent: &BlockRef,
        fields: Vec<Rc<Field>>,
    ) -> Header {
        FieldSequence::new(id, SequenceKind::Header, offset, sequence_number, parent.clone(), fields)
    }

    pub fn create_footer(
        &self,
        id: BlockId,
        offset: u64,
        sequence_number: usize,
        parent: &BlockRef,
        fields: Vec<Rc<Field>>,
    ) -> Footer {
        FieldSequence::new(id, SequenceKind::Footer, offset, sequence_number, parent.clone(), fields)
    }

    pub fn create_lazy_payload(
        &self,
        id: BlockId,
        kind: PayloadKind,
        offset: u64,
        parent: &BlockRef,
        size: u64,
        source: PayloadSource,
    ) -> Payload {
        Payload::lazy(id, kind, offset, parent.clone(), size, source)
    }

    pub fn create_loaded_payload(
        &self,
        id: BlockId,
        kind: PayloadKind,
        offset: u64,
        parent: &BlockRef,
        children: Vec<PayloadChild>,
    ) -> Result<Payload> {
        Payload::loaded(id, kind, offset, parent.clone(), children)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_container(
        &self,
        id: BlockId,
        offset: u64,
        sequence_number: usize,
        parent: Option<&BlockRef>,
        headers: Vec<Header>,
        payload: Payload,
        footers: Vec<Footer>,
        context: Rc<ContainerContext>,
    ) -> Container {
        Container::new(
            id,
            offset,
            sequence_number,
            parent.cloned(),
            headers,
            payload,
            footers,
            context,
        )
    }
}

/// True for the synthetic field appended to parents with unaccounted bytes.
pub fn is_unknown_field(field: &Field) -> bool {
    field.id().local_id() == UNKNOWN_FIELD_ID && field.field_type() == FieldType::Binary
}
