//! Entity and DTO conversion around an operation

use std::sync::Arc;

use async_trait::async_trait;

use crate::capability::Capabilities;
use crate::entity::{Entity, Presentation};
use crate::error::Result;
use crate::mapper::Mapper;
use crate::pipeline::{
    CallContext, Interceptor, Next, Operation, OperationMarkers, Output, Patch, PatchForm, Record,
    MAPPING_ORDER,
};

const NAME: &str = "Mapping";

/// Converts DTO arguments to entities and entity results to DTOs
///
/// Records already in the target form pass through untouched. Partial
/// payloads in DTO field names are renamed through [`Mapper::patch_to_entity`].
pub struct MappingInterceptor<E: Entity, D: Presentation> {
    mapper: Arc<dyn Mapper<E, D>>,
}

impl<E: Entity, D: Presentation> MappingInterceptor<E, D> {
    /// Convert with the given mapper
    pub fn new(mapper: Arc<dyn Mapper<E, D>>) -> Self {
        Self { mapper }
    }

    fn to_entity(&self, record: Record<E, D>) -> Result<Record<E, D>> {
        match record {
            Record::Dto(dto) => Ok(Record::Entity(self.mapper.to_entity(dto)?)),
            entity => Ok(entity),
        }
    }

    fn patch_to_entity(&self, patch: Patch) -> Result<Patch> {
        match patch.form {
            PatchForm::Dto => Ok(Patch::entity(self.mapper.patch_to_entity(patch.fields)?)),
            PatchForm::Entity => Ok(patch),
        }
    }

    fn to_dto(&self, record: Record<E, D>) -> Result<Record<E, D>> {
        match record {
            Record::Entity(entity) => Ok(Record::Dto(self.mapper.to_dto(entity)?)),
            dto => Ok(dto),
        }
    }
}

#[async_trait]
impl<E: Entity, D: Presentation> Interceptor<E, D> for MappingInterceptor<E, D> {
    fn name(&self) -> &'static str {
        NAME
    }

    fn order(&self) -> i32 {
        MAPPING_ORDER
    }

    fn applies_to(&self, markers: &OperationMarkers, capabilities: &Capabilities) -> bool {
        markers.mapping.is_some() && capabilities.mappable
    }

    async fn intercept(
        &self,
        operation: Operation<E, D>,
        ctx: &CallContext,
        next: Next<'_, E, D>,
    ) -> Result<Output<E, D>> {
        let Some(marker) = ctx.markers.mapping else {
            return next.run(operation).await;
        };
        ctx.method_call(NAME);

        let operation = if marker.map_argument {
            operation
                .try_map_records(|record| self.to_entity(record))?
                .try_map_patches(|patch| self.patch_to_entity(patch))?
        } else {
            operation
        };

        let output = next.run(operation).await?;

        let output = if marker.map_result {
            output.try_map_records(|record| self.to_dto(record))?
        } else {
            output
        };

        ctx.method_finish(NAME);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{BaseOperation, Pipeline};
    use crate::repository::{Page, Pagination};
    use crate::test_support::{Department, Employee, EmployeeDto, EmployeeMapper, Hobby};

    struct EchoBase;

    #[async_trait]
    impl BaseOperation<Employee, EmployeeDto> for EchoBase {
        async fn execute(
            &self,
            operation: Operation<Employee, EmployeeDto>,
        ) -> Result<Output<Employee, EmployeeDto>> {
            match operation {
                Operation::Save(Record::Entity(mut employee)) => {
                    employee.id = Some(1);
                    Ok(Output::Record(Record::Entity(employee)))
                }
                Operation::Save(Record::Dto(_)) => Err(crate::Error::BadRequest(
                    "base received a dto".to_string(),
                )),
                Operation::PatchAll(patches) => Ok(Output::List(
                    patches
                        .into_iter()
                        .map(|patch| {
                            assert_eq!(patch.form, PatchForm::Entity);
                            crate::entity::document::from_document(patch.to_document())
                                .map(Record::Entity)
                        })
                        .collect::<Result<Vec<_>>>()?,
                )),
                Operation::FindAll(pagination) => Ok(Output::Page(Page::new(
                    vec![Record::Entity(Employee {
                        id: Some(5),
                        name: "ada".to_string(),
                        department: Some(Department {
                            id: Some(2),
                            ..Department::default()
                        }),
                        hobbies: vec![Hobby::named("chess")],
                    })],
                    &pagination,
                    1,
                ))),
                _ => Ok(Output::Empty),
            }
        }
    }

    fn pipeline(capabilities: Capabilities) -> Pipeline<Employee, EmployeeDto> {
        Pipeline::new(
            vec![Arc::new(MappingInterceptor::new(Arc::new(EmployeeMapper)))
                as Arc<dyn Interceptor<Employee, EmployeeDto>>],
            OperationMarkers::defaults,
            capabilities,
            Arc::new(EchoBase),
        )
    }

    fn mappable() -> Capabilities {
        Capabilities {
            mappable: true,
            ..Capabilities::none()
        }
    }

    #[tokio::test]
    async fn test_save_maps_argument_and_result() {
        let dto = EmployeeDto {
            id: None,
            name: "ada".to_string(),
            department_id: Some(2),
            hobbies: vec!["chess".to_string()],
        };

        let output = pipeline(mappable())
            .execute(Operation::Save(Record::Dto(dto)))
            .await
            .unwrap();

        let Output::Record(Record::Dto(saved)) = output else {
            panic!("expected a dto result");
        };
        assert_eq!(saved.id, Some(1));
        assert_eq!(saved.department_id, Some(2));
        assert_eq!(saved.hobbies, vec!["chess".to_string()]);
    }

    #[tokio::test]
    async fn test_find_all_maps_every_page_item() {
        let output = pipeline(mappable())
            .execute(Operation::FindAll(Pagination::first_page(10)))
            .await
            .unwrap();

        let Output::Page(page) = output else {
            panic!("expected a page");
        };
        assert_eq!(page.total, 1);
        assert!(matches!(
            &page.content[0],
            Record::Dto(EmployeeDto { department_id: Some(2), .. })
        ));
    }

    #[tokio::test]
    async fn test_patch_all_renames_dto_fields() {
        let mut fields = serde_json::Map::new();
        fields.insert("id".to_string(), serde_json::json!(4));
        fields.insert("department_id".to_string(), serde_json::json!(2));

        let output = pipeline(mappable())
            .execute(Operation::PatchAll(vec![Patch::dto(fields)]))
            .await
            .unwrap();

        let Output::List(records) = output else {
            panic!("expected a list");
        };
        assert!(matches!(
            &records[0],
            Record::Dto(EmployeeDto { id: Some(4), department_id: Some(2), .. })
        ));
    }

    #[tokio::test]
    async fn test_not_mappable_passes_through() {
        let pipeline = pipeline(Capabilities::none());
        assert!(pipeline
            .interceptor_names(crate::pipeline::OperationKind::Save)
            .is_empty());

        let result = pipeline
            .execute(Operation::Save(Record::Dto(EmployeeDto::default())))
            .await;
        assert!(result.is_err());
    }
}
