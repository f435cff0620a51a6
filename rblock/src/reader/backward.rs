use std::rc::Rc;

use log::{debug, trace};

use rcore::{BlockId, PhysicalType};

use crate::block::{BlockRef, Container, Payload, PayloadSource};
use crate::context::ContainerContext;
use crate::error::{BlockError, Result};

use super::{consume, payload_kind, step_back, DataBlockReader};

impl DataBlockReader {
    // Footers, payload, headers with the cursor moving down from `offset`,
    // which is the end of the container.
    pub(super) fn read_container_backward(
        self: &Rc<Self>,
        offset: u64,
        id: &BlockId,
        parent: Option<&BlockRef>,
        mut remaining: Option<u64>,
        parent_context: Option<Rc<ContainerContext>>,
        sequence_number: usize,
    ) -> Result<Container> {
        let context = self.new_context(parent_context);
        let desc = self.describe(id)?;

        // A fixed size container can be identified before anything is read
        let mut id = id.clone();
        let mut resolved = !desc.generic;
        if desc.generic {
            if let Some(size) = self.specification().static_size_of(&id) {
                let start = step_back(&id, offset, size, remaining)?;
                id = self.determine_actual_container_id(start, &id, Some(size), &context)?;
                resolved = true;
            }
        }
        if resolved {
            context.init_container(BlockRef::new(id.clone(), sequence_number))?;
        }
        debug!("Reading {} backward from {}", id, offset);

        let me = BlockRef::new(id.clone(), sequence_number);
        let children = self.specification().children_of(&id);
        let mut cursor = offset;

        let mut footers = Vec::new();
        for child in children
            .iter()
            .rev()
            .filter(|c| c.physical_type == PhysicalType::Footer)
        {
            let mut read =
                self.read_headers_or_footers_with_id(cursor, &child.id, &me, remaining, &context)?;
            if let Some(first) = read.first() {
                remaining = consume(&child.id, remaining, cursor - first.offset())?;
                cursor = first.offset();
            }
            read.reverse();
            footers.extend(read);
        }
        footers.reverse();

        let payload_desc = self.specification().payload_of(&id).ok_or_else(|| {
            BlockError::InvalidSpecification(format!("container {} has no payload", id))
        })?;
        let payload = self.read_payload(cursor, &payload_desc.id, &me, remaining, &context)?;
        cursor = payload.offset();
        remaining = consume(payload.id(), remaining, payload.total_size())?;

        let mut headers = Vec::new();
        for child in children
            .iter()
            .rev()
            .filter(|c| c.physical_type == PhysicalType::Header)
        {
            let mut read =
                self.read_headers_or_footers_with_id(cursor, &child.id, &me, remaining, &context)?;
            if let Some(first) = read.first() {
                remaining = consume(&child.id, remaining, cursor - first.offset())?;
                cursor = first.offset();
            }
            read.reverse();
            headers.extend(read);
        }
        headers.reverse();

        if !resolved {
            let size = offset - cursor;
            id = self.determine_actual_container_id(cursor, &id, Some(size), &context)?;
            context.init_container(BlockRef::new(id.clone(), sequence_number))?;
        }

        trace!("{} spans {}..{}", id, cursor, offset);
        Ok(self.factory().create_container(
            id,
            cursor,
            sequence_number,
            parent,
            headers,
            payload,
            footers,
            context,
        ))
    }

    // Without a forward fallback the payload size has to be known up front
    pub(super) fn read_payload_backward(
        self: &Rc<Self>,
        offset: u64,
        id: &BlockId,
        parent: &BlockRef,
        remaining: Option<u64>,
        context: &Rc<ContainerContext>,
    ) -> Result<Payload> {
        let desc = self.describe(id)?;
        let kind = payload_kind(&desc)?;

        let size = context.get_size_of(id, 0)?.ok_or_else(|| {
            BlockError::InvalidSpecification(format!(
                "size of payload {} is unknown, it cannot be read backward",
                id
            ))
        })?;
        let start = step_back(id, offset, size, remaining)?;

        if !self.provider().is_random_access() {
            self.provider().buffer_before_read(start, Some(size))?;
        }

        Ok(self.factory().create_lazy_payload(
            id.clone(),
            kind,
            start,
            parent,
            size,
            PayloadSource {
                reader: self.forward_reader(),
                context: context.clone(),
            },
        ))
    }
}
