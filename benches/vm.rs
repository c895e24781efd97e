//! Benchmarks for the bytecode compiler and VM.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use monkeylang::ast::Program;
use monkeylang::bytecode::{Compiler, Vm, VmState};
use monkeylang::lexer::Scanner;
use monkeylang::parser::Parser;
use std::fs;

/// Parse source into an AST.
fn parse(source: &str) -> Program {
    let tokens = Scanner::new(source).scan_tokens().expect("lexer error");
    Parser::new(tokens).parse().expect("parser error")
}

/// Compile and execute in a fresh state.
fn run_vm(program: &Program) {
    let mut state = VmState::new();
    let bytecode = Compiler::new(&mut state)
        .compile(program)
        .expect("compile error");
    Vm::new(&mut state, bytecode).run().expect("vm runtime error");
}

fn load_program(name: &str) -> String {
    let path = format!("benches/programs/{}.monkey", name);
    fs::read_to_string(&path).unwrap_or_else(|_| panic!("failed to read {}", path))
}

fn programs(c: &mut Criterion) {
    let mut group = c.benchmark_group("programs");

    for name in ["fib", "tail_loop", "strings"] {
        let program = parse(&load_program(name));
        group.bench_with_input(BenchmarkId::new("vm", name), &program, |b, program| {
            b.iter(|| run_vm(black_box(program)))
        });
    }

    group.finish();
}

fn fib_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("fib_scaling");

    for n in [10, 15, 20].iter() {
        let source = format!(
            r#"
fib := fn(n) {{
    if (n < 2) {{ return n; }}
    fib(n - 1) + fib(n - 2)
}};
fib({});
"#,
            n
        );
        let program = parse(&source);

        group.bench_with_input(BenchmarkId::new("vm", n), &program, |b, program| {
            b.iter(|| run_vm(black_box(program)))
        });
    }

    group.finish();
}

/// Benchmark compilation time alone (not execution).
fn compilation_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("compilation_overhead");

    for name in ["fib", "strings"] {
        let program = parse(&load_program(name));
        group.bench_with_input(BenchmarkId::new("compile", name), &program, |b, program| {
            b.iter(|| {
                let mut state = VmState::new();
                let bytecode = Compiler::new(&mut state)
                    .compile(black_box(program))
                    .unwrap();
                bytecode
            })
        });
    }

    group.finish();
}

criterion_group!(benches, programs, fib_scaling, compilation_overhead);

criterion_main!(benches);
