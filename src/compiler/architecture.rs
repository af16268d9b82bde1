// Architecture compilation
//
// Compiles a pair of input and output schemas into the files consumed by the
// tensor runtime: one file per custom module with the main module first, the
// criterion, and the conversion procedures moving values in and out of
// tensors for both sides of the network.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::compiler::StrategyDispatch;
use crate::graph::lua::{call, local, raw, string, Block, Expr, Stmt};
use crate::graph::{CustomModule, Module, Node};
use crate::interpretation::InterpretationRegistry;
use crate::internal::config::CompilerConfig;
use crate::internal::error::Result;
use crate::schema::types::Schema;
use crate::tensor::TensorSchema;

/// Name of the file holding the conversion procedures
pub const CONVERSION_FILE: &str = "Conversion.lua";

/// A generated source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// Path relative to the output directory
    pub path: String,
    pub contents: String,
}

/// Everything produced by compiling an architecture
#[derive(Debug, Clone)]
pub struct CompiledArchitecture {
    /// Input schema as presented to the network
    pub input_schema: Schema,
    /// Output schema as presented to the network
    pub output_schema: Schema,
    pub input_tensor_schema: TensorSchema,
    pub output_tensor_schema: TensorSchema,
    /// Generated files in emission order
    pub files: Vec<GeneratedFile>,
}

impl CompiledArchitecture {
    /// Looks up a generated file by path
    pub fn file(&self, path: &str) -> Option<&GeneratedFile> {
        self.files.iter().find(|file| file.path == path)
    }

    /// Writes every generated file below `directory`, creating it if needed
    pub fn write_to<P: AsRef<Path>>(&self, directory: P) -> Result<()> {
        let directory = directory.as_ref();
        fs::create_dir_all(directory)?;
        for file in &self.files {
            let path = directory.join(&file.path);
            fs::write(&path, &file.contents)?;
            info!(path = %path.display(), bytes = file.contents.len(), "Wrote generated file");
        }
        Ok(())
    }
}

/// Compiles schemas into runtime source files
#[derive(Debug)]
pub struct ArchitectureCompiler<'a> {
    registry: &'a InterpretationRegistry,
    dispatch: StrategyDispatch,
}

impl<'a> ArchitectureCompiler<'a> {
    /// Creates a compiler with the default configuration
    pub fn new(registry: &'a InterpretationRegistry) -> Self {
        Self {
            registry,
            dispatch: StrategyDispatch::with_defaults(CompilerConfig::default()),
        }
    }

    /// Creates a compiler with an explicit configuration
    pub fn with_config(registry: &'a InterpretationRegistry, config: CompilerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry,
            dispatch: StrategyDispatch::with_defaults(config),
        })
    }

    pub fn dispatch(&self) -> &StrategyDispatch {
        &self.dispatch
    }

    fn config(&self) -> &CompilerConfig {
        self.dispatch.config()
    }

    /// Included fields of `schema` in the form the network sees them
    pub fn network_schema(&self, schema: &Schema) -> Result<Schema> {
        let filtered = schema.filter_included();
        let mut network = self
            .registry
            .get("object")?
            .transform_schema_for_network(&filtered, self.registry)?;
        network.update_variable_names_and_paths();
        Ok(network)
    }

    /// Tensor layout of a detected schema's network form
    pub fn tensor_schema(&self, schema: &Schema) -> Result<TensorSchema> {
        self.dispatch.tensor_schema(&self.network_schema(schema)?)
    }

    /// Compiles the architecture mapping `input` to `output`
    pub fn compile(&self, input: &Schema, output: &Schema) -> Result<CompiledArchitecture> {
        let input_schema = self.network_schema(input)?;
        let output_schema = self.network_schema(output)?;

        let name = &self.config().architecture_name;
        let root_module = format!("{}Module", name);
        let root_criterion = format!("{}Criterion", name);

        let input_node = Node::source(Module::new("nn.Identity"), format!("{}_input", root_module));
        let input_stack = self.dispatch.input_stack(&input_schema, &input_node, name)?;
        let output_stack = self.dispatch.output_stack(
            &output_schema,
            &input_stack.output_node,
            &input_stack.output_tensor_schema,
            name,
        )?;

        let mut additional = input_stack.additional_modules;
        additional.extend(output_stack.additional_modules);
        let dependencies = additional.iter().map(|m| m.name().to_string()).collect();
        let main_module = CustomModule::new(root_module.clone(), input_node, output_stack.output_node, dependencies);

        let debug_nodes = self.config().debug_nodes;
        let mut files = Vec::new();
        for module in std::iter::once(&main_module).chain(additional.iter()) {
            debug!(module = module.name(), "Emitting module");
            files.push(GeneratedFile {
                path: module.filename(),
                contents: module.generate_code(debug_nodes),
            });
        }

        let criterion = self.dispatch.criterion(&output_schema)?;
        files.push(GeneratedFile {
            path: format!("{}.lua", root_criterion),
            contents: criterion_file(&root_criterion, criterion),
        });
        files.push(GeneratedFile {
            path: CONVERSION_FILE.to_string(),
            contents: self.conversion_file(&input_schema, &output_schema)?,
        });

        info!(
            architecture = %name,
            modules = additional.len() + 1,
            files = files.len(),
            "Compiled architecture"
        );

        Ok(CompiledArchitecture {
            input_tensor_schema: self.dispatch.tensor_schema(&input_schema)?,
            output_tensor_schema: self.dispatch.tensor_schema(&output_schema)?,
            input_schema,
            output_schema,
            files,
        })
    }

    /// Source of the conversion procedures for both sides of the network
    fn conversion_file(&self, input: &Schema, output: &Schema) -> Result<String> {
        let mut file = Block(vec![
            Stmt::Call(call("require", vec![string("torch")])),
            Stmt::Blank,
            local("conversion", Expr::Table(Vec::new())),
        ]);

        for (side, schema) in [("Input", input), ("Output", output)] {
            let procedures = [
                format!("convert{}In", side),
                format!("convert{}Out", side),
                format!("prepare{}Batch", side),
                format!("unwind{}Batch", side),
            ];
            let statements = [
                self.dispatch.tensor_input_code(schema, &procedures[0])?,
                self.dispatch.tensor_output_code(schema, &procedures[1])?,
                self.dispatch.prepare_batch_code(schema, &procedures[2])?,
                self.dispatch.unwind_batch_code(schema, &procedures[3])?,
            ];

            file.push(Stmt::Blank);
            file.push(Stmt::Comment(format!("{} conversion", side)));
            for (procedure, statement) in procedures.iter().zip(statements) {
                file.push(statement);
                file.push(export(procedure));
            }

            if self.config().localize_tensors {
                let localize = format!("localize{}", side);
                file.push(self.dispatch.tensor_schema(schema)?.localize_function(&localize));
                file.push(export(&localize));
            }
        }

        file.push(Stmt::Blank);
        file.push(Stmt::Return(raw("conversion")));
        Ok(file.render())
    }
}

/// `conversion.<name> = <name>`
fn export(name: &str) -> Stmt {
    Stmt::Assign(raw(format!("conversion.{}", name)), raw(name))
}

/// Source of the file defining the criterion constructor
fn criterion_file(name: &str, criterion: Module) -> String {
    let constructor = format!("nn.{}", name);
    Block(vec![
        Stmt::Call(call("require", vec![string("nn")])),
        Stmt::Blank,
        Stmt::FunctionDecl(
            constructor.clone(),
            Vec::new(),
            Block(vec![
                local("criterion", Expr::Module(criterion)),
                Stmt::Return(raw("criterion")),
            ]),
        ),
        Stmt::Blank,
        Stmt::Return(raw(constructor)),
    ])
    .render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::SchemaType;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn number(name: &str) -> Schema {
        let mut schema = Schema::leaf(name, SchemaType::Number);
        schema.metadata.main_interpretation = Some("number".to_string());
        schema.configuration.interpretation = json!({"mode": "continuous_raw"});
        schema
    }

    fn object(properties: Vec<(&str, Schema)>) -> Schema {
        let properties: BTreeMap<String, Schema> =
            properties.into_iter().map(|(name, schema)| (name.to_string(), schema)).collect();
        let mut schema = Schema::object("", properties);
        schema.metadata.main_interpretation = Some("object".to_string());
        schema.configuration.interpretation = json!({});
        schema
    }

    fn schemas() -> (Schema, Schema) {
        let mut inner = object(vec![("c", number("c")), ("d", number("d"))]);
        inner.metadata.main_interpretation = Some("object".to_string());
        let mut input = object(vec![("a", number("a")), ("b", inner)]);
        input.update_variable_names_and_paths();

        let mut output = object(vec![("total", number("total"))]);
        output.update_variable_names_and_paths();
        (input, output)
    }

    #[test]
    fn test_emits_every_file() {
        let registry = InterpretationRegistry::with_defaults();
        let compiler = ArchitectureCompiler::new(&registry);
        let (input, output) = schemas();
        let compiled = compiler.compile(&input, &output).unwrap();

        let paths: Vec<&str> = compiled.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["mainModule.lua", "mainCriterion.lua", "Conversion.lua"]);
        assert_eq!(compiled.input_tensor_schema.size(), 3);

        let module = &compiled.file("mainModule.lua").unwrap().contents;
        assert!(module.contains("function nn.mainModule()\n"));
        assert!(module.contains("    local mainModule_input = nn.Identity()()\n"));
        assert!(module.contains("nn.gModule({mainModule_input}, {main_root_outputObject})"));

        let criterion = &compiled.file("mainCriterion.lua").unwrap().contents;
        assert!(criterion.contains("function nn.mainCriterion()\n"));
        assert!(criterion.contains("    local criterion = nn.ParallelCriterion()\n"));

        let conversion = &compiled.file(CONVERSION_FILE).unwrap().contents;
        for procedure in [
            "convertInputIn",
            "convertInputOut",
            "prepareInputBatch",
            "unwindInputBatch",
            "convertOutputIn",
            "convertOutputOut",
            "prepareOutputBatch",
            "unwindOutputBatch",
            "localizeInput",
            "localizeOutput",
        ] {
            assert!(conversion.contains(&format!("conversion.{} = {}\n", procedure, procedure)));
        }
        assert!(conversion.ends_with("return conversion\n"));
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let registry = InterpretationRegistry::with_defaults();
        let compiler = ArchitectureCompiler::new(&registry);
        let (input, output) = schemas();
        let first = compiler.compile(&input, &output).unwrap();
        let second = compiler.compile(&input, &output).unwrap();
        assert_eq!(first.files, second.files);
        assert_eq!(first.input_tensor_schema, second.input_tensor_schema);
    }

    #[test]
    fn test_excluded_fields_are_skipped() {
        let registry = InterpretationRegistry::with_defaults();
        let compiler = ArchitectureCompiler::new(&registry);
        let (mut input, output) = schemas();
        input.set_included("b", false).unwrap();

        let compiled = compiler.compile(&input, &output).unwrap();
        assert_eq!(compiled.input_tensor_schema.size(), 1);
        assert_eq!(compiled.input_schema.children().len(), 1);
    }

    #[test]
    fn test_write_to_directory() {
        let registry = InterpretationRegistry::with_defaults();
        let compiler = ArchitectureCompiler::new(&registry);
        let (input, output) = schemas();
        let compiled = compiler.compile(&input, &output).unwrap();

        let directory = tempfile::tempdir().unwrap();
        let target = directory.path().join("generated");
        compiled.write_to(&target).unwrap();
        let written = fs::read_to_string(target.join("Conversion.lua")).unwrap();
        assert_eq!(written, compiled.file(CONVERSION_FILE).unwrap().contents);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let registry = InterpretationRegistry::with_defaults();
        let config = CompilerConfig {
            architecture_name: String::new(),
            ..CompilerConfig::default()
        };
        assert!(ArchitectureCompiler::with_config(&registry, config).is_err());
    }
}
