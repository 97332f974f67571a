//! Fixtures shared by the benchmarks and the timing binary.

use std::rc::Rc;

use stencil_reactive::{Reference, Tag, TrackedCell, combine, value_for_tag};
use stencil_runtime::testing::MemoryTree;
use stencil_runtime::vm::RerenderStats;
use stencil_runtime::{
    Args, CapabilityFlags, ComponentCapabilities, ComponentDefinition, ComponentManager, CompiledLayout,
    CreateRequest, DynamicScope, Environment, Expr, Invocation, ObjectValue, Program, ProgramBuilder,
    ProgramSymbolTable, RenderResult, ResolverRegistry, Result, Template, Value, render_main,
};

/// Template-only row that takes part in updates
pub struct RowManager;

impl ComponentManager for RowManager {
    type Definition = Template;
    type Instance = ();

    const CAPABILITIES: ComponentCapabilities = ComponentCapabilities::from_flags(
        CapabilityFlags::CREATE_INSTANCE.union(CapabilityFlags::UPDATE_HOOK),
    );

    fn debug_name(&self, _definition: &Template) -> String {
        "Row".to_string()
    }

    fn create(&self, _definition: &Template, _request: CreateRequest<'_>) {}

    fn get_static_layout(&self, definition: &Template) -> Option<Template> {
        Some(definition.clone())
    }
}

fn field(row: usize) -> String {
    format!("row{row}")
}

/// `rows` components, each rendering one field of the host state
pub struct RowsFixture {
    program: Program,
    root: CompiledLayout,
    registry: ResolverRegistry,
    state: Rc<ObjectValue>,
    env: Environment,
    tree: MemoryTree,
    result: Option<RenderResult>,
    rows: usize,
}

impl RowsFixture {
    pub fn new(rows: usize) -> Result<Self> {
        let mut builder = ProgramBuilder::new();
        let row_layout = builder.layout(ProgramSymbolTable::new(["@value"]), |layout| {
            layout
                .open_element("li")
                .flush_element()
                .append(Expr::var("@value"))
                .close_element();
        })?;
        let mut registry = ResolverRegistry::new();
        let row = registry.register_component(
            "row",
            ComponentDefinition::new(Rc::new(RowManager), Template::new(row_layout)),
        );
        let root = builder.layout(ProgramSymbolTable::default(), |layout| {
            layout.open_element("ul").flush_element();
            for index in 0..rows {
                layout.invoke_static(
                    row,
                    Invocation::new(Args::new().named("value", Expr::this().get(&field(index)))),
                );
            }
            layout.close_element();
        })?;

        let state = Rc::new(ObjectValue::new());
        for index in 0..rows {
            state.set(&field(index), Value::from(index as i32));
        }
        Ok(Self {
            program: builder.build(),
            root,
            registry,
            state,
            env: Environment::default(),
            tree: MemoryTree::new(),
            result: None,
            rows,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Initial render into a fresh tree
    pub fn render(&mut self) -> Result<()> {
        if let Some(previous) = self.result.take() {
            previous.destroy(&mut self.env, &mut self.tree)?;
        }
        self.tree = MemoryTree::new();
        let result = render_main(
            &mut self.env,
            &self.program,
            &self.registry,
            &mut self.tree,
            &self.root,
            Reference::constant(Value::Object(Rc::clone(&self.state))),
            DynamicScope::new(),
        )?;
        self.result = Some(result);
        Ok(())
    }

    /// Change the value one row renders
    pub fn touch(&self, row: usize) {
        let key = field(row % self.rows.max(1));
        let next = match self.state.peek(&key) {
            Value::Number(value) => value + 1.0,
            _ => 0.0,
        };
        self.state.set(&key, Value::Number(next));
    }

    pub fn rerender(&mut self) -> Result<RerenderStats> {
        match self.result.as_mut() {
            Some(result) => result.rerender(&mut self.env, &self.program, &self.registry, &mut self.tree),
            None => Ok(RerenderStats::default()),
        }
    }

    pub fn html(&self) -> String {
        self.tree.to_html()
    }
}

/// Cells whose tags are combined into one, for validation benchmarks
pub struct TagFixture {
    pub cells: Vec<TrackedCell<u64>>,
    pub combined: Tag,
}

impl TagFixture {
    pub fn new(width: usize) -> Self {
        let cells: Vec<TrackedCell<u64>> = (0..width as u64).map(TrackedCell::new).collect();
        let combined = combine(cells.iter().map(|cell| cell.tag().clone()));
        Self { cells, combined }
    }

    pub fn snapshot(&self) -> stencil_reactive::Revision {
        value_for_tag(&self.combined)
    }
}

#[cfg(test)]
mod tests {
    use stencil_reactive::validate_tag;

    use super::*;

    #[test]
    fn rows_render_and_update_one_at_a_time() {
        let mut fixture = RowsFixture::new(3).unwrap();
        fixture.render().unwrap();
        assert_eq!(fixture.html(), "<ul><li>0</li><li>1</li><li>2</li></ul>");

        fixture.touch(1);
        let stats = fixture.rerender().unwrap();
        assert_eq!(stats.skipped_groups, 2);
        assert_eq!(fixture.html(), "<ul><li>0</li><li>2</li><li>2</li></ul>");
    }

    #[test]
    fn combined_tag_sees_any_cell_change() {
        let fixture = TagFixture::new(8);
        let snapshot = fixture.snapshot();
        assert!(validate_tag(&fixture.combined, snapshot));
        fixture.cells[5].set(50);
        assert!(!validate_tag(&fixture.combined, snapshot));
    }
}
