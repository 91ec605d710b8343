//! Resource thread driving a renderer, with futures awaited elsewhere.

mod common;

use std::sync::Arc;

use render_core::backend::{BackendCall, NullBackend, ShaderType};
use render_core::resources::{MemoryFile, Resource, ShaderManager, ShaderStatus};
use render_core::{DrawCommand, RenderConfig, RenderError, RenderResult, RenderServer, Renderer};
use rstest::rstest;

type Server = RenderServer<Renderer<NullBackend>>;

fn server() -> Server {
    let config = RenderConfig::default().with_resource_thread_name("render-test");
    let init_config = config.clone();
    RenderServer::start(&config, move || common::renderer_with(init_config)).unwrap()
}

#[test]
fn same_shader_file_is_created_once() {
    let mut backend = NullBackend::new();
    let mut manager = ShaderManager::new();
    let file = MemoryFile::new("shared.frag", common::FRAGMENT_SOURCE);

    let first = manager
        .create(&mut backend, ShaderType::Fragment, file.clone(), ShaderStatus::Compiled)
        .unwrap();
    let second = manager
        .create(&mut backend, ShaderType::Fragment, file, ShaderStatus::Compiled)
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(manager.len(), 1);
    assert_eq!(
        backend.count(|call| matches!(call, BackendCall::CompileShader(_))),
        1
    );
    assert_eq!(
        backend.count(|call| matches!(call, BackendCall::CreateShader(..))),
        1
    );
}

#[test]
fn failing_task_rethrows_its_message() {
    let server = server();
    let mut future = server.spawn_resource_task(|_: &mut Renderer<NullBackend>| -> RenderResult<()> {
        Err(RenderError::TaskFailed("x".to_string()))
    });

    let err = future.get().unwrap_err();
    assert_eq!(err.to_string(), "x");
    assert!(!future.valid());
}

#[test]
fn panicking_task_does_not_kill_the_thread() {
    let server = server();
    let mut future = server.spawn_resource_task(|_: &mut Renderer<NullBackend>| -> RenderResult<u32> {
        panic!("x")
    });
    assert_eq!(future.get().unwrap_err(), RenderError::TaskPanicked("x".into()));
    assert!(!future.valid());

    let mut alive = server.spawn_resource_task(|renderer: &mut Renderer<NullBackend>| {
        Ok(renderer.backend().name())
    });
    assert_eq!(alive.get().unwrap(), "Null Backend");
    assert!(server.is_running());
}

#[test]
fn program_is_linked_on_the_resource_thread() {
    let server = server();
    let mut created = server.spawn_resource_task(|renderer: &mut Renderer<NullBackend>| {
        let program = common::program(renderer, "threaded");
        let quad = common::quad(renderer);
        let drawn = renderer.draw(&DrawCommand::new(&program, &quad))?;
        Ok((program, quad, drawn))
    });

    let (program, quad, drawn) = created.get().unwrap();
    assert!(drawn);
    assert!(program.is_valid());
    assert_eq!(quad.num_indices(), 6);

    let mut draws = server.spawn_resource_task(|renderer: &mut Renderer<NullBackend>| {
        Ok(renderer
            .backend()
            .count(|call| matches!(call, BackendCall::Draw(..))))
    });
    assert_eq!(draws.get().unwrap(), 1);
}

#[test]
fn compile_errors_reach_the_caller() {
    let server = server();
    let mut future = server.spawn_resource_task(|renderer: &mut Renderer<NullBackend>| {
        let broken = renderer.create_shader(
            ShaderType::Vertex,
            MemoryFile::new("broken.vert", "void main() {\n#error missing semicolon\n}\n"),
            ShaderStatus::InMemory,
        )?;
        let program = renderer.create_program(vec![broken]);
        let quad = common::quad(renderer);
        renderer.draw(&DrawCommand::new(&program, &quad))
    });

    match future.get() {
        Err(RenderError::ShaderCompilationFailed { path, log }) => {
            assert_eq!(path, "broken.vert");
            assert!(log.contains("#error missing semicolon"), "{log}");
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[rstest]
#[case::single_thread(1)]
#[case::several_threads(4)]
fn futures_complete_across_threads(#[case] threads: usize) {
    let server = Arc::new(server());
    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let server = server.clone();
            std::thread::spawn(move || {
                let mut future = server.spawn_resource_task(move |renderer: &mut Renderer<NullBackend>| {
                    let program = common::program(renderer, &format!("worker{i}"));
                    renderer.make_program_valid(&program)?;
                    Ok(program.id())
                });
                future.get().unwrap()
            })
        })
        .collect();

    let mut ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), threads);
}

#[test]
fn shutdown_completes_pending_futures() {
    let mut server = server();
    let mut queued: Vec<_> = (0..10)
        .map(|i| server.spawn_resource_task(move |_: &mut Renderer<NullBackend>| Ok(i)))
        .collect();
    server.shutdown();

    for (i, future) in queued.iter_mut().enumerate() {
        assert_eq!(future.get().unwrap(), i);
    }
    let mut late = server.spawn_resource_task(|_: &mut Renderer<NullBackend>| Ok(()));
    assert_eq!(late.get().unwrap_err(), RenderError::ServerShutdown);
}
